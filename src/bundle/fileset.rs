//! File-set resolution.
//!
//! Expands a `{source, target, includes, excludes, rename, replace}`
//! specification into a concrete, deterministically sorted list of
//! (input, output) pairs. Zero matches is not an error: callers treat an
//! empty resolution as a no-op unless the action semantically requires at
//! least one file.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{FileSetSpec, PatternPair};
use super::variables::VariableContext;
use crate::error::{BundleError, Result};

/// One resolved input/output pairing. `output` is absent when the file set
/// was resolved in input-only mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
}

/// A `replace` pattern pair with the regex compiled and templates resolved.
#[derive(Debug, Clone)]
pub struct Replacement {
    pattern: Regex,
    substitution: String,
}

impl Replacement {
    pub fn compile(pair: &PatternPair, context: &VariableContext) -> Result<Self> {
        Self::compile_with(pair, context, &IndexMap::new())
    }

    /// Compile with invocation-scoped variables layered over the context.
    pub fn compile_with(
        pair: &PatternPair,
        context: &VariableContext,
        extra: &IndexMap<String, String>,
    ) -> Result<Self> {
        let from = context.resolve_with(&pair.from, extra)?;
        let to = context.resolve_with(&pair.to, extra)?;
        let pattern = Regex::new(&from)
            .map_err(|e| BundleError::Configuration(format!("invalid pattern '{from}': {e}")))?;
        Ok(Self {
            pattern,
            substitution: backrefs_to_regex(&to),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.substitution.as_str())
            .into_owned()
    }

    /// Rewrite a file's contents in place.
    pub fn apply_to_file(&self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        let replaced = self.apply(&contents);
        fs::write(path, replaced).map_err(|e| BundleError::io(path, e))
    }
}

/// Translate `\1` / `\g<name>` backreferences into the replacement syntax
/// the regex engine expects, treating `$` as a literal.
fn backrefs_to_regex(to: &str) -> String {
    let mut out = String::with_capacity(to.len());
    let mut chars = to.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek() {
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let mut name = String::new();
                        for inner in chars.by_ref() {
                            if inner == '>' {
                                break;
                            }
                            name.push(inner);
                        }
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push('g');
                    }
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(*d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(&format!("${{{digits}}}"));
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

/// Expand a file set into sorted (input, output) pairs.
///
/// With `ignore_target` the target side is skipped entirely: no directory
/// is created, no rename is applied, and every pair's `output` is `None`.
pub fn resolve(
    spec: &FileSetSpec,
    context: &VariableContext,
    ignore_target: bool,
) -> Result<Vec<FilePair>> {
    if spec.includes.is_none() && spec.excludes.is_none() {
        return resolve_single(spec, context, ignore_target);
    }
    resolve_multi(spec, context, ignore_target)
}

fn resolve_single(
    spec: &FileSetSpec,
    context: &VariableContext,
    ignore_target: bool,
) -> Result<Vec<FilePair>> {
    let input = PathBuf::from(context.resolve_str(&spec.source)?);
    let output = if ignore_target {
        None
    } else {
        let target = spec.target.as_ref().ok_or_else(|| {
            BundleError::Configuration("file set has no target".to_string())
        })?;
        Some(PathBuf::from(context.resolve_str(target)?))
    };
    Ok(vec![FilePair { input, output }])
}

fn resolve_multi(
    spec: &FileSetSpec,
    context: &VariableContext,
    ignore_target: bool,
) -> Result<Vec<FilePair>> {
    let source_dir = PathBuf::from(context.resolve_str(&spec.source)?);
    let target_dir = if ignore_target {
        None
    } else {
        let target = spec.target.as_ref().ok_or_else(|| {
            BundleError::Configuration("file set has no target".to_string())
        })?;
        let dir = PathBuf::from(context.resolve_str(target)?);
        fs::create_dir_all(&dir).map_err(|e| BundleError::io(&dir, e))?;
        Some(dir)
    };

    let includes: Vec<String> = match &spec.includes {
        Some(patterns) => patterns
            .iter()
            .map(|p| context.resolve_str(p))
            .collect::<std::result::Result<_, _>>()?,
        None => vec!["*".to_string()],
    };
    let excludes: Vec<String> = match &spec.excludes {
        Some(patterns) => patterns
            .iter()
            .map(|p| context.resolve_str(p))
            .collect::<std::result::Result<_, _>>()?,
        None => Vec::new(),
    };
    let exclude_set = build_glob_set(&excludes)?;

    let rename = spec
        .rename
        .as_ref()
        .filter(|_| !ignore_target)
        .map(|pair| Replacement::compile(pair, context))
        .transpose()?;

    // Relative paths of regular files under source, in one walk.
    let mut candidates = Vec::new();
    if source_dir.is_dir() {
        for entry in WalkDir::new(&source_dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                BundleError::Configuration(format!(
                    "cannot walk {}: {e}",
                    source_dir.display()
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&source_dir)
                .map_err(|e| BundleError::Configuration(e.to_string()))?
                .to_path_buf();
            candidates.push(relative);
        }
    }

    let mut selected = Vec::new();
    for pattern in &includes {
        let include_set = build_glob_set(std::slice::from_ref(pattern))?;
        let mut matched_any = false;
        for relative in &candidates {
            if include_set.is_match(relative) && !exclude_set.is_match(relative) {
                matched_any = true;
                if !selected.contains(relative) {
                    selected.push(relative.clone());
                }
            }
        }
        if !matched_any && !pattern.contains(['*', '?', '[', ']']) {
            tracing::warn!(
                pattern = %pattern,
                source = %source_dir.display(),
                "include pattern matched no files"
            );
        }
    }
    selected.sort();

    let mut pairs = Vec::with_capacity(selected.len());
    for relative in selected {
        let input = source_dir.join(&relative);
        let output = match &target_dir {
            None => None,
            Some(dir) => {
                let base = relative
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let name = match &rename {
                    Some(replacement) => replacement.apply(&base),
                    None => base,
                };
                Some(dir.join(name))
            }
        };
        pairs.push(FilePair { input, output });
    }
    Ok(pairs)
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                BundleError::Configuration(format!("invalid glob pattern '{pattern}': {e}"))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| BundleError::Configuration(format!("cannot build glob set: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn context() -> VariableContext {
        VariableContext::resolve(&IndexMap::new(), &[]).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "# placeholder\n").unwrap();
    }

    #[test]
    fn test_single_file_mode() {
        let spec = FileSetSpec {
            source: "in/gist.ttl".to_string(),
            target: Some("out/gist.ttl".to_string()),
            ..FileSetSpec::default()
        };
        let pairs = resolve(&spec, &context(), false).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].input, PathBuf::from("in/gist.ttl"));
        assert_eq!(pairs[0].output, Some(PathBuf::from("out/gist.ttl")));
    }

    #[test]
    fn test_includes_and_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        touch(&src, "a.ttl");
        touch(&src, "draft_a.ttl");
        touch(&src, "b.owl");

        let spec = FileSetSpec {
            source: src.display().to_string(),
            target: Some(tmp.path().join("out").display().to_string()),
            includes: Some(vec!["*.ttl".to_string()]),
            excludes: Some(vec!["draft_*.ttl".to_string()]),
            ..FileSetSpec::default()
        };
        let pairs = resolve(&spec, &context(), false).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].input, src.join("a.ttl"));
        assert_eq!(
            pairs[0].output.as_deref(),
            Some(tmp.path().join("out").join("a.ttl").as_path())
        );
    }

    #[test]
    fn test_zero_matches_is_empty_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        touch(&src, "readme.md");

        let spec = FileSetSpec {
            source: src.display().to_string(),
            target: Some(tmp.path().join("out").display().to_string()),
            includes: Some(vec!["*.ttl".to_string()]),
            ..FileSetSpec::default()
        };
        let pairs = resolve(&spec, &context(), false).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_results_are_sorted_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        for name in ["c.ttl", "a.ttl", "b.ttl"] {
            touch(&src, name);
        }

        let spec = FileSetSpec {
            source: src.display().to_string(),
            includes: Some(vec!["*.ttl".to_string()]),
            ..FileSetSpec::default()
        };
        let pairs = resolve(&spec, &context(), true).unwrap();
        let names: Vec<_> = pairs
            .iter()
            .map(|p| p.input.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.ttl", "b.ttl", "c.ttl"]);
        assert!(pairs.iter().all(|p| p.output.is_none()));
    }

    #[test]
    fn test_rename_with_numbered_backreference() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        touch(&src, "gist.owl");

        let spec = FileSetSpec {
            source: src.display().to_string(),
            target: Some(tmp.path().join("out").display().to_string()),
            includes: Some(vec!["*.owl".to_string()]),
            rename: Some(PatternPair {
                from: "(.*)\\.owl".to_string(),
                to: "\\1_v2.owl".to_string(),
            }),
            ..FileSetSpec::default()
        };
        let pairs = resolve(&spec, &context(), false).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(
            pairs[0].output.as_ref().unwrap().file_name().unwrap(),
            "gist_v2.owl"
        );
    }

    #[test]
    fn test_rename_with_named_group() {
        let replacement = Replacement::compile(
            &PatternPair {
                from: "(?P<stem>.*)\\.md".to_string(),
                to: "\\g<stem>.html".to_string(),
            },
            &context(),
        )
        .unwrap();
        assert_eq!(replacement.apply("index.md"), "index.html");
    }

    #[test]
    fn test_replace_in_file_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("versioned.ttl");
        fs::write(&file, "<urn:x> <urn:version> \"X.x.x\" .\n").unwrap();

        let replacement = Replacement::compile(
            &PatternPair {
                from: "X\\.x\\.x".to_string(),
                to: "1.2.3".to_string(),
            },
            &context(),
        )
        .unwrap();
        replacement.apply_to_file(&file).unwrap();
        let contents = fs::read_to_string(&file).unwrap();
        assert!(contents.contains("1.2.3"));
    }

    #[test]
    fn test_dollar_in_replacement_is_literal() {
        let replacement = Replacement::compile(
            &PatternPair {
                from: "price".to_string(),
                to: "$cost".to_string(),
            },
            &context(),
        )
        .unwrap();
        assert_eq!(replacement.apply("price list"), "$cost list");
    }
}
