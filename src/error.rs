//! Error taxonomy for the bundle pipeline.
//!
//! Every failure class the dispatcher can surface maps to one variant of
//! [`BundleError`]. All of them are fatal and halt the pipeline; only
//! [`BundleError::Validation`] is an expected, modeled outcome of a `verify`
//! action rather than a defect in the bundle definition or its inputs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving `{name}` templates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("undefined variable '{name}' in \"{value}\"")]
    Undefined { name: String, value: String },

    #[error("cyclic variable reference involving '{name}'")]
    Cycle { name: String },

    #[error("unbalanced brace in \"{value}\" (use '{{{{' for a literal brace)")]
    Unbalanced { value: String },
}

/// Top-level error type for bundle execution.
#[derive(Error, Debug)]
pub enum BundleError {
    /// Schema violation, unknown tool reference, malformed file set or
    /// query specification. Reported before or at the offending action.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Undefined or cyclic variable reference.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Zero or multiple ontology declarations where exactly one is required.
    #[error("graph structure error in {scope}: {message}")]
    GraphStructure { scope: String, message: String },

    /// Malformed query, or endpoint network/HTTP failure. Never retried.
    #[error("query '{label}' against {target} failed: {message}")]
    QueryExecution {
        label: String,
        target: String,
        message: String,
    },

    /// A `verify` action produced one or more failing verdicts.
    #[error("verification '{action}' failed: {failed} of {total} queries failed")]
    Validation {
        action: String,
        failed: usize,
        total: usize,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn query(
        label: impl Into<String>,
        target: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        BundleError::QueryExecution {
            label: label.into(),
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// True for the one failure class that is an expected pipeline outcome.
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, BundleError::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_names_offender() {
        let err = TemplateError::Undefined {
            name: "output".to_string(),
            value: "{output}/gist.ttl".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'output'"));
        assert!(text.contains("{output}/gist.ttl"));
    }

    #[test]
    fn test_validation_failure_is_distinguished() {
        let validation = BundleError::Validation {
            action: "verify".to_string(),
            failed: 1,
            total: 3,
        };
        let config = BundleError::Configuration("missing tool".to_string());
        assert!(validation.is_validation_failure());
        assert!(!config.is_validation_failure());
    }
}
