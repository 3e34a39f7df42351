//! Bundle specification model.
//!
//! A bundle file (YAML or JSON) declares a name, a variable map, a list of
//! tool definitions and an ordered action list. The action and tool kinds
//! are closed tagged variants: an unknown `action:` or `type:` tag is a
//! deserialization error, and every dispatch over them is an exhaustive
//! `match`.

pub mod dispatcher;
pub mod fileset;
pub mod transform;
pub mod variables;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{BundleError, Result, TemplateError};
use variables::VariableContext;

/// Top-level bundle definition.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSpec {
    /// Bundle name, logged at the start of a run.
    pub bundle: String,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub actions: Vec<ActionSpec>,
}

impl BundleSpec {
    /// Semantic checks that run before any action: unique tool names,
    /// resolvable tool references, well-formed query specifications.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name()) {
                return Err(BundleError::Configuration(format!(
                    "duplicate tool name '{}'",
                    tool.name()
                )));
            }
        }
        for (index, action) in self.actions.iter().enumerate() {
            action
                .validate(&self.tools)
                .map_err(|e| match e {
                    BundleError::Configuration(msg) => BundleError::Configuration(format!(
                        "action #{} ({}): {}",
                        index + 1,
                        action.kind(),
                        msg
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }
}

/// External tool definition, referenced by name from `transform` actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolSpec {
    /// Runs `command` with the given argument templates.
    Process {
        name: String,
        command: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
    /// Runs the first argument as the program, the rest as its arguments.
    Shell { name: String, arguments: Vec<String> },
    /// Applies a SPARQL UPDATE (inline text or file path) to each input.
    Sparql { name: String, query: String },
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Process { name, .. } => name,
            ToolSpec::Shell { name, .. } => name,
            ToolSpec::Sparql { name, .. } => name,
        }
    }
}

/// A `{from, to}` pattern pair.
///
/// `from` is a regular expression; `to` may carry `\1`-style numbered
/// backreferences (or `\g<name>` for named groups).
#[derive(Debug, Clone, Deserialize)]
pub struct PatternPair {
    pub from: String,
    pub to: String,
}

/// A `{source, target, includes, excludes, rename, replace}` file set.
///
/// Without `includes`/`excludes`, `source` and `target` are single paths.
/// With them, both are directories and the patterns are glob expressions
/// evaluated against files under `source`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSetSpec {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    #[serde(default)]
    pub rename: Option<PatternPair>,
    #[serde(default)]
    pub replace: Option<PatternPair>,
}

/// Input-only file set used for `queries` and `shapes`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryFileSet {
    pub source: String,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
}

impl QueryFileSet {
    pub fn as_file_set(&self) -> FileSetSpec {
        FileSetSpec {
            source: self.source.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            ..FileSetSpec::default()
        }
    }
}

/// Remote SPARQL endpoint coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    pub query_uri: String,
    #[serde(default)]
    pub update_uri: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Merge target for `export`.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeSpec {
    pub iri: String,
    pub version: String,
}

/// A boolean that may be written as a YAML boolean or a templated string
/// ("yes", "true", "t", "1" count as true after resolution).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplatedBool {
    Flag(bool),
    Text(String),
}

impl TemplatedBool {
    pub fn resolve(&self, context: &VariableContext) -> std::result::Result<bool, TemplateError> {
        match self {
            TemplatedBool::Flag(value) => Ok(*value),
            TemplatedBool::Text(text) => {
                let resolved = context.resolve_str(text)?;
                Ok(matches!(
                    resolved.to_lowercase().as_str(),
                    "yes" | "true" | "t" | "1"
                ))
            }
        }
    }
}

/// Resolve an optional templated boolean with a default.
pub fn resolve_flag(
    flag: &Option<TemplatedBool>,
    context: &VariableContext,
    default: bool,
) -> std::result::Result<bool, TemplateError> {
    match flag {
        Some(value) => value.resolve(context),
        None => Ok(default),
    }
}

/// Validation strategy of a `verify` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerifyKind {
    Select,
    Ask,
    Construct,
    Shacl,
}

/// Inference applied to the data graph before SHACL validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InferenceMode {
    Rdfs,
    Owlrl,
    Both,
    None,
}

/// Severity threshold for construct/shacl verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailOn {
    Violation,
    Warning,
}

/// definedBy annotation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DefinedByMode {
    /// Classes, object/datatype/annotation properties and named individuals.
    Strict,
    /// Every non-blank subject with at least one non-type property.
    All,
}

/// One step of the pipeline. Ordering is significant and preserved exactly
/// as declared.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionSpec {
    Mkdir(MkdirAction),
    Copy(CopyAction),
    Move(MoveAction),
    Transform(TransformAction),
    DefinedBy(DefinedByAction),
    Export(ExportAction),
    Sparql(SparqlAction),
    Verify(VerifyAction),
    Markdown(MarkdownAction),
    Graph(GraphAction),
}

impl ActionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::Mkdir(_) => "mkdir",
            ActionSpec::Copy(_) => "copy",
            ActionSpec::Move(_) => "move",
            ActionSpec::Transform(_) => "transform",
            ActionSpec::DefinedBy(_) => "definedBy",
            ActionSpec::Export(_) => "export",
            ActionSpec::Sparql(_) => "sparql",
            ActionSpec::Verify(_) => "verify",
            ActionSpec::Markdown(_) => "markdown",
            ActionSpec::Graph(_) => "graph",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ActionSpec::Mkdir(a) => a.message.as_deref(),
            ActionSpec::Copy(a) => a.message.as_deref(),
            ActionSpec::Move(a) => a.message.as_deref(),
            ActionSpec::Transform(a) => a.message.as_deref(),
            ActionSpec::DefinedBy(a) => a.message.as_deref(),
            ActionSpec::Export(a) => a.message.as_deref(),
            ActionSpec::Sparql(a) => a.message.as_deref(),
            ActionSpec::Verify(a) => a.message.as_deref(),
            ActionSpec::Markdown(a) => a.message.as_deref(),
            ActionSpec::Graph(a) => a.message.as_deref(),
        }
    }

    fn validate(&self, tools: &[ToolSpec]) -> Result<()> {
        match self {
            ActionSpec::Copy(a) => require_target(&a.files),
            ActionSpec::Move(a) => require_target(&a.files),
            ActionSpec::Markdown(a) => require_target(&a.files),
            ActionSpec::Transform(a) => {
                require_target(&a.files)?;
                if !tools.iter().any(|t| t.name() == a.tool) {
                    return Err(BundleError::Configuration(format!(
                        "unknown tool reference '{}'",
                        a.tool
                    )));
                }
                Ok(())
            }
            ActionSpec::DefinedBy(a) => require_target(&a.files),
            ActionSpec::Sparql(a) => {
                require_query_spec(&a.query, &a.queries)?;
                if a.source.is_none() && a.endpoint.is_none() {
                    return Err(BundleError::Configuration(
                        "either a source file set or an endpoint is required".to_string(),
                    ));
                }
                if a.each_file.is_some() && a.endpoint.is_some() {
                    return Err(BundleError::Configuration(
                        "eachFile and endpoint are mutually exclusive".to_string(),
                    ));
                }
                Ok(())
            }
            ActionSpec::Verify(a) => {
                match a.kind {
                    VerifyKind::Shacl => {
                        if a.shapes.is_none() {
                            return Err(BundleError::Configuration(
                                "shacl verification requires a shapes file set".to_string(),
                            ));
                        }
                    }
                    VerifyKind::Ask => {
                        require_query_spec(&a.query, &a.queries)?;
                        if a.expected.is_none() {
                            return Err(BundleError::Configuration(
                                "ask verification requires an expected value".to_string(),
                            ));
                        }
                    }
                    VerifyKind::Select | VerifyKind::Construct => {
                        require_query_spec(&a.query, &a.queries)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn require_target(files: &FileSetSpec) -> Result<()> {
    if files.target.is_none() {
        return Err(BundleError::Configuration(
            "a target is required".to_string(),
        ));
    }
    Ok(())
}

fn require_query_spec(query: &Option<String>, queries: &Option<QueryFileSet>) -> Result<()> {
    match (query, queries) {
        (None, None) => Err(BundleError::Configuration(
            "either 'query' or 'queries' must be given".to_string(),
        )),
        (Some(_), Some(_)) => Err(BundleError::Configuration(
            "'query' and 'queries' are mutually exclusive".to_string(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MkdirAction {
    pub directory: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopyAction {
    #[serde(flatten)]
    pub files: FileSetSpec,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveAction {
    #[serde(flatten)]
    pub files: FileSetSpec,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformAction {
    pub tool: String,
    #[serde(flatten)]
    pub files: FileSetSpec,
    /// Output serialization for SPARQL tools (defaults to the input format).
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinedByAction {
    #[serde(flatten)]
    pub files: FileSetSpec,
    #[serde(default)]
    pub mode: Option<DefinedByMode>,
    #[serde(default)]
    pub retain_defined_by: Option<TemplatedBool>,
    #[serde(default)]
    pub versioned_defined_by: Option<TemplatedBool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAction {
    pub source: String,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    pub target: String,
    /// turtle (default), xml or nt; nquads when a context is given.
    #[serde(default)]
    pub format: Option<String>,
    /// Named graph IRI receiving the exported triples.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub compress: Option<TemplatedBool>,
    #[serde(default)]
    pub merge: Option<MergeSpec>,
    #[serde(default)]
    pub defined_by: Option<String>,
    #[serde(default)]
    pub strip_versions: Option<TemplatedBool>,
    #[serde(default)]
    pub retain_defined_by: Option<TemplatedBool>,
    #[serde(default)]
    pub versioned_defined_by: Option<TemplatedBool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExportAction {
    pub fn input_set(&self) -> FileSetSpec {
        FileSetSpec {
            source: self.source.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            ..FileSetSpec::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparqlAction {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub queries: Option<QueryFileSet>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub endpoint: Option<EndpointSpec>,
    /// Repeat the query set per input file instead of over their union.
    #[serde(default)]
    pub each_file: Option<TemplatedBool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SparqlAction {
    pub fn input_set(&self) -> Option<FileSetSpec> {
        self.source.as_ref().map(|source| FileSetSpec {
            source: source.clone(),
            target: self.target.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            ..FileSetSpec::default()
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAction {
    #[serde(rename = "type")]
    pub kind: VerifyKind,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub queries: Option<QueryFileSet>,
    /// Required for `ask`: the boolean result every query must produce.
    #[serde(default)]
    pub expected: Option<bool>,
    #[serde(default)]
    pub stop_on_fail: Option<TemplatedBool>,
    #[serde(default)]
    pub fail_on: Option<FailOn>,
    /// Shapes file set for `shacl`.
    #[serde(default)]
    pub shapes: Option<QueryFileSet>,
    #[serde(default)]
    pub inference: Option<InferenceMode>,
    #[serde(default)]
    pub endpoint: Option<EndpointSpec>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VerifyAction {
    pub fn input_set(&self) -> Option<FileSetSpec> {
        self.source.as_ref().map(|source| FileSetSpec {
            source: source.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            ..FileSetSpec::default()
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkdownAction {
    #[serde(flatten)]
    pub files: FileSetSpec,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphAction {
    pub source: String,
    #[serde(default)]
    pub includes: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    /// Output directory for the rendered schema graphic.
    pub target: String,
    pub title: String,
    pub version: String,
    #[serde(default)]
    pub compact: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl GraphAction {
    pub fn input_set(&self) -> FileSetSpec {
        FileSetSpec {
            source: self.source.clone(),
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
            ..FileSetSpec::default()
        }
    }
}
