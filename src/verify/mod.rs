//! Validation engine.
//!
//! One `verify` action runs one of four strategies: `select` (non-empty
//! result set fails), `ask` (result must match `expected`), `construct`
//! (non-empty constructed report fails, filtered by `failOn`) and `shacl`
//! (shape validation, same filter). Any failing verdict halts the bundle
//! with a non-zero outcome; `stopOnFail: false` lets the remaining queries
//! run and write their artifacts first.

pub mod inference;
pub mod report;
pub mod shacl;

use oxigraph::model::NamedNode;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::variables::VariableContext;
use crate::bundle::{FailOn, VerifyAction, VerifyKind, fileset, resolve_flag};
use crate::error::{BundleError, Result};
use crate::graph::vocab::sh;
use crate::graph::{GraphModel, OutputFormat};
use crate::query::endpoint::EndpointClient;
use crate::query::{QueryOutcome, build_query_list, execute_local, select_csv_string};

/// Severity ladder for report rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

impl Severity {
    pub fn to_iri(self) -> NamedNode {
        match self {
            Severity::Info => sh::INFO.into_owned(),
            Severity::Warning => sh::WARNING.into_owned(),
            Severity::Violation => sh::VIOLATION.into_owned(),
        }
    }
}

pub fn run(action: &VerifyAction, context: &VariableContext) -> Result<()> {
    match action.kind {
        VerifyKind::Select => verify_select(action, context),
        VerifyKind::Ask => verify_ask(action, context),
        VerifyKind::Construct => verify_construct(action, context),
        VerifyKind::Shacl => verify_shacl(action, context),
    }
}

fn build_input_graph(action: &VerifyAction, context: &VariableContext) -> Result<GraphModel> {
    let input = action.input_set().ok_or_else(|| {
        BundleError::Configuration("verify requires a source file set".to_string())
    })?;
    let mut model = GraphModel::new()?;
    let pairs = fileset::resolve(&input, context, true)?;
    model.load_files(pairs.iter().map(|pair| pair.input.as_path()))?;
    tracing::debug!(triples = model.len(), "verification graph assembled");
    Ok(model)
}

fn verdict(action: &VerifyAction, failed: usize, total: usize) -> Result<()> {
    if failed > 0 {
        Err(BundleError::Validation {
            action: action.kind.to_string(),
            failed,
            total,
        })
    } else {
        Ok(())
    }
}

/// Where a failing query's artifact goes: `target` itself under
/// `stopOnFail`, one file per failing query under a `target` directory
/// otherwise.
fn failure_artifact(
    target: &str,
    stop_on_fail: bool,
    label: &str,
    suffix: &str,
) -> Result<PathBuf> {
    if stop_on_fail {
        Ok(PathBuf::from(target))
    } else {
        fs::create_dir_all(target).map_err(|e| BundleError::io(target, e))?;
        let stem = Path::new(label)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("query");
        Ok(Path::new(target).join(format!("{stem}.{suffix}")))
    }
}

fn verify_select(action: &VerifyAction, context: &VariableContext) -> Result<()> {
    let queries = build_query_list(&action.query, &action.queries, context)?;
    let model = build_input_graph(action, context)?;
    let stop_on_fail = resolve_flag(&action.stop_on_fail, context, true)?;

    let mut failed = 0;
    for query in &queries {
        tracing::debug!(query = %query.label, "executing SELECT verification");
        let QueryOutcome::Rows { columns, rows } = execute_local(&model, query)? else {
            return Err(BundleError::Configuration(format!(
                "invalid query for SELECT verify: {}",
                query.label
            )));
        };
        if rows.is_empty() {
            continue;
        }
        failed += 1;
        let serialized = select_csv_string(&columns, &rows);
        if let Some(target) = &action.target {
            let target = context.resolve_str(target)?;
            let path = failure_artifact(&target, stop_on_fail, &query.label, "csv")?;
            fs::write(&path, &serialized).map_err(|e| BundleError::io(&path, e))?;
        }
        tracing::error!(
            query = %query.label,
            "verification query produced non-empty results:\n{}",
            serialized
        );
        if stop_on_fail {
            break;
        }
    }
    verdict(action, failed, queries.len())
}

fn verify_ask(action: &VerifyAction, context: &VariableContext) -> Result<()> {
    let queries = build_query_list(&action.query, &action.queries, context)?;
    let model = build_input_graph(action, context)?;
    let stop_on_fail = resolve_flag(&action.stop_on_fail, context, true)?;
    let expected = action.expected.ok_or_else(|| {
        BundleError::Configuration("ask verification requires an expected value".to_string())
    })?;

    let mut failed = 0;
    for query in &queries {
        let QueryOutcome::Boolean(answer) = execute_local(&model, query)? else {
            return Err(BundleError::Configuration(format!(
                "invalid query for ASK verify: {}",
                query.label
            )));
        };
        if answer != expected {
            failed += 1;
            tracing::error!(
                query = %query.label,
                expected,
                "verification ASK query did not match expected result"
            );
            if stop_on_fail {
                break;
            }
        }
    }
    verdict(action, failed, queries.len())
}

fn verify_construct(action: &VerifyAction, context: &VariableContext) -> Result<()> {
    let queries = build_query_list(&action.query, &action.queries, context)?;
    let stop_on_fail = resolve_flag(&action.stop_on_fail, context, true)?;
    let fail_on_warning = action.fail_on == Some(FailOn::Warning);

    let client = action
        .endpoint
        .as_ref()
        .map(|spec| EndpointClient::from_spec(spec, context))
        .transpose()?;
    let model = match client {
        Some(_) => None,
        None => Some(build_input_graph(action, context)?),
    };

    let mut failed = 0;
    for query in &queries {
        tracing::debug!(query = %query.label, "executing CONSTRUCT verification");
        let constructed = match (&client, &model) {
            (Some(client), _) => client.construct(&query.label, &query.text)?,
            (None, Some(model)) => match execute_local(model, query)? {
                QueryOutcome::Graph(graph) => graph,
                _ => {
                    return Err(BundleError::Configuration(format!(
                        "invalid query for CONSTRUCT verify: {}",
                        query.label
                    )));
                }
            },
            (None, None) => unreachable!("either endpoint or local graph is set"),
        };
        if constructed.is_empty() {
            continue;
        }

        let summary = report::format_validation_results(&constructed)?;
        if summary.rows == 0 {
            tracing::warn!(
                query = %query.label,
                "CONSTRUCT verification did not produce a well-formed validation report"
            );
        } else if summary.fails(fail_on_warning) {
            tracing::error!(
                query = %query.label,
                "verification query produced non-empty results:\n{}",
                summary.table
            );
        } else {
            tracing::warn!(
                query = %query.label,
                "verification query produced non-empty results:\n{}",
                summary.table
            );
        }

        if let Some(target) = &action.target {
            let target = context.resolve_str(target)?;
            let path = failure_artifact(&target, stop_on_fail, &query.label, "ttl")?;
            constructed.write_file(&path, OutputFormat::Turtle, false)?;
        }

        if summary.fails(fail_on_warning) {
            failed += 1;
            if stop_on_fail {
                break;
            }
        }
    }
    verdict(action, failed, queries.len())
}

fn verify_shacl(action: &VerifyAction, context: &VariableContext) -> Result<()> {
    let data = build_input_graph(action, context)?;

    let shapes_spec = action.shapes.as_ref().ok_or_else(|| {
        BundleError::Configuration("shacl verification requires a shapes file set".to_string())
    })?;
    let shape_pairs = fileset::resolve(&shapes_spec.as_file_set(), context, true)?;
    if shape_pairs.is_empty() {
        // Unlike other file sets, an empty shapes resolution would silently
        // validate nothing, so it is rejected.
        return Err(BundleError::Configuration(
            "shapes file set resolved to no files".to_string(),
        ));
    }
    let mut shapes = GraphModel::new()?;
    shapes.load_files(shape_pairs.iter().map(|pair| pair.input.as_path()))?;
    tracing::debug!(
        data_triples = data.len(),
        shape_triples = shapes.len(),
        "running SHACL validation"
    );

    if let Some(mode) = action.inference {
        inference::apply(mode, &data)?;
        tracing::debug!(data_triples = data.len(), "inference applied");
    }

    let validator = shacl::ShaclValidator::compile(&shapes)?;
    let validation_report = validator.validate(&data)?;
    if validation_report.is_empty() {
        return Ok(());
    }

    if let Some(target) = &action.target {
        let target = context.resolve_str(target)?;
        let path = PathBuf::from(target);
        validation_report.write_file(&path, OutputFormat::Turtle, false)?;
    }

    let summary = report::format_validation_results(&validation_report)?;
    let fail_on_warning = action.fail_on == Some(FailOn::Warning);
    if summary.rows == 0 {
        tracing::warn!(
            "SHACL verification did not produce a well-formed validation report:\n{}",
            summary.table
        );
    } else if summary.fails(fail_on_warning) {
        tracing::error!(
            "SHACL verification produced non-empty results:\n{}",
            summary.table
        );
    } else {
        tracing::warn!(
            "SHACL verification produced non-empty results:\n{}",
            summary.table
        );
    }

    if summary.fails(fail_on_warning) {
        return Err(BundleError::Validation {
            action: action.kind.to_string(),
            failed: 1,
            total: 1,
        });
    }
    Ok(())
}
