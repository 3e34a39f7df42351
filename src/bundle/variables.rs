//! Variable resolution.
//!
//! A bundle's variable map may reference other variables with `{name}`
//! placeholders, transitively. The context is resolved once, after CLI
//! overrides are applied, and frozen for the rest of the run; action fields
//! are resolved against the frozen map at dispatch time. Resolution is pure
//! and never touches the filesystem.

use indexmap::IndexMap;

use crate::error::TemplateError;

type Result<T> = std::result::Result<T, TemplateError>;

/// One piece of a parsed template: literal text or a `{name}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// Split a template into literal and variable segments.
///
/// `{{` and `}}` escape literal braces; a lone brace is an error.
fn parse_template(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => name.push(inner),
                        None => {
                            return Err(TemplateError::Unbalanced {
                                value: template.to_string(),
                            });
                        }
                    }
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name));
            }
            '}' => {
                return Err(TemplateError::Unbalanced {
                    value: template.to_string(),
                });
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Fully resolved, immutable variable context.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: IndexMap<String, String>,
}

impl VariableContext {
    /// Build a context from bundle defaults and CLI override pairs.
    ///
    /// Overrides win on identical keys. Every value is resolved until no
    /// `{name}` tokens remain; a reference to an unknown name or a cycle is
    /// an error.
    pub fn resolve(
        defaults: &IndexMap<String, String>,
        overrides: &[(String, String)],
    ) -> Result<Self> {
        let mut raw = defaults.clone();
        for (name, value) in overrides {
            raw.insert(name.clone(), value.clone());
        }

        let mut resolved = IndexMap::with_capacity(raw.len());
        for name in raw.keys() {
            let mut stack = Vec::new();
            resolve_name(name, &raw, &mut resolved, &mut stack)?;
        }
        Ok(Self { values: resolved })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve a template against the frozen context.
    pub fn resolve_str(&self, template: &str) -> Result<String> {
        self.resolve_with(template, &IndexMap::new())
    }

    /// Resolve a template with additional invocation-scoped values (such as
    /// `inputFile`/`outputFile` during tool runs) layered over the context.
    pub fn resolve_with(&self, template: &str, extra: &IndexMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        for segment in parse_template(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Variable(name) => {
                    let value = extra
                        .get(&name)
                        .map(String::as_str)
                        .or_else(|| self.get(&name))
                        .ok_or_else(|| TemplateError::Undefined {
                            name: name.clone(),
                            value: template.to_string(),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn resolve_name(
    name: &str,
    raw: &IndexMap<String, String>,
    resolved: &mut IndexMap<String, String>,
    stack: &mut Vec<String>,
) -> Result<String> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if stack.iter().any(|n| n == name) {
        return Err(TemplateError::Cycle {
            name: name.to_string(),
        });
    }

    let template = raw.get(name).cloned().ok_or_else(|| TemplateError::Undefined {
        name: name.to_string(),
        value: stack
            .last()
            .and_then(|enclosing| raw.get(enclosing))
            .cloned()
            .unwrap_or_default(),
    })?;

    stack.push(name.to_string());
    let mut out = String::with_capacity(template.len());
    for segment in parse_template(&template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Variable(reference) => {
                out.push_str(&resolve_name(&reference, raw, resolved, stack)?);
            }
        }
    }
    stack.pop();

    resolved.insert(name.to_string(), out.clone());
    Ok(out)
}
