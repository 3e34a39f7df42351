//! The `sparql` action: run a query set against the combined inputs, each
//! input file independently, or a remote endpoint.
//!
//! Output structure is identical across the three modes: one artifact per
//! query per grouping unit. SELECT artifacts are CSV, CONSTRUCT artifacts
//! use the action's serialization format, UPDATE mutates the graph which is
//! then re-serialized to the target.

use std::fs;
use std::path::{Path, PathBuf};

use super::endpoint::EndpointClient;
use super::{NamedQuery, QueryForm, QueryOutcome};
use crate::bundle::variables::VariableContext;
use crate::bundle::{SparqlAction, fileset, resolve_flag};
use crate::error::{BundleError, Result};
use crate::graph::{GraphModel, OutputFormat};

pub fn run(action: &SparqlAction, context: &VariableContext) -> Result<()> {
    let queries = super::build_query_list(&action.query, &action.queries, context)?;
    if queries.is_empty() {
        tracing::debug!("sparql action resolved no queries, skipping");
        return Ok(());
    }

    let target = action
        .target
        .as_ref()
        .map(|t| context.resolve_str(t))
        .transpose()?
        .map(PathBuf::from);
    let format_name = action
        .format
        .as_ref()
        .map(|f| context.resolve_str(f))
        .transpose()?;
    let format = OutputFormat::from_option(format_name.as_deref())?;

    if let Some(endpoint_spec) = &action.endpoint {
        let client = EndpointClient::from_spec(endpoint_spec, context)?;
        return run_endpoint(&client, &queries, target.as_deref(), format);
    }

    let input = action.input_set().ok_or_else(|| {
        BundleError::Configuration("sparql action requires a source".to_string())
    })?;

    if resolve_flag(&action.each_file, context, false)? {
        run_each_file(&input, context, &queries, format)
    } else {
        run_combined(&input, context, &queries, target.as_deref(), format)
    }
}

/// All inputs merged into one graph, the query set run once over it.
fn run_combined(
    input: &crate::bundle::FileSetSpec,
    context: &VariableContext,
    queries: &[NamedQuery],
    target: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let mut model = GraphModel::new()?;
    let pairs = fileset::resolve(input, context, true)?;
    model.load_files(pairs.iter().map(|pair| pair.input.as_path()))?;
    tracing::debug!(triples = model.len(), "combined input graph assembled");

    let updated = run_query_set(&model, queries, target, format)?;
    if updated {
        let target = target.ok_or_else(|| {
            BundleError::Configuration("update queries require a target".to_string())
        })?;
        tracing::debug!(target = %target.display(), "saving updated graph");
        model.write_file(target, format, false)?;
    }
    Ok(())
}

/// The query set repeated independently per input file.
fn run_each_file(
    input: &crate::bundle::FileSetSpec,
    context: &VariableContext,
    queries: &[NamedQuery],
    format: OutputFormat,
) -> Result<()> {
    for pair in fileset::resolve(input, context, false)? {
        let mut model = GraphModel::new()?;
        model.load_file(&pair.input)?;
        tracing::debug!(
            input = %pair.input.display(),
            triples = model.len(),
            "per-file input graph loaded"
        );

        let output = pair.output.as_deref();
        let updated = run_query_set(&model, queries, output, format)?;
        if updated {
            let output = output.ok_or_else(|| {
                BundleError::Configuration("update queries require a target".to_string())
            })?;
            model.write_file(output, format, false)?;
        }
    }
    Ok(())
}

/// Run every query, writing SELECT/CONSTRUCT artifacts. Returns whether any
/// UPDATE ran.
fn run_query_set(
    model: &GraphModel,
    queries: &[NamedQuery],
    target: Option<&Path>,
    format: OutputFormat,
) -> Result<bool> {
    let mut updated = false;
    for query in queries {
        match super::execute_local(model, query)? {
            QueryOutcome::Updated => updated = true,
            QueryOutcome::Rows { columns, rows } => {
                let path = artifact_path(target, queries.len(), &query.label, "csv")?;
                let file = fs::File::create(&path).map_err(|e| BundleError::io(&path, e))?;
                super::write_select_csv(file, &columns, &rows)
                    .map_err(|e| BundleError::io(&path, e))?;
            }
            QueryOutcome::Graph(constructed) => {
                let path = artifact_path(target, queries.len(), &query.label, format.suffix())?;
                constructed.write_file(&path, format, false)?;
            }
            QueryOutcome::Boolean(_) => {
                return Err(BundleError::query(
                    &query.label,
                    "local graph",
                    "ASK queries belong in verify actions",
                ));
            }
        }
    }
    Ok(updated)
}

fn artifact_path(
    target: Option<&Path>,
    query_count: usize,
    label: &str,
    suffix: &str,
) -> Result<PathBuf> {
    let target = target.ok_or_else(|| {
        BundleError::Configuration("a target is required for query output".to_string())
    })?;
    let path = super::output_file_name(target, query_count, label, suffix);
    if query_count > 1 {
        fs::create_dir_all(target).map_err(|e| BundleError::io(target, e))?;
    } else if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BundleError::io(parent, e))?;
        }
    }
    Ok(path)
}

/// The same query set against a remote endpoint.
fn run_endpoint(
    client: &EndpointClient,
    queries: &[NamedQuery],
    target: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    for query in queries {
        match super::detect_form(&query.label, &query.text)? {
            QueryForm::Update => client.update(&query.label, &query.text)?,
            QueryForm::Select => {
                let bytes = client.select_csv(&query.label, &query.text)?;
                let path = artifact_path(target, queries.len(), &query.label, "csv")?;
                fs::write(&path, bytes).map_err(|e| BundleError::io(&path, e))?;
            }
            QueryForm::Construct => {
                let constructed = client.construct(&query.label, &query.text)?;
                let path = artifact_path(target, queries.len(), &query.label, format.suffix())?;
                constructed.write_file(&path, format, false)?;
            }
            QueryForm::Ask => {
                return Err(BundleError::query(
                    &query.label,
                    &client.display(),
                    "ASK queries belong in verify actions",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn context() -> VariableContext {
        VariableContext::resolve(&IndexMap::new(), &[]).unwrap()
    }

    fn write_data(dir: &Path, name: &str) {
        fs::write(
            dir.join(name),
            r#"@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
               <http://example.com/a> rdfs:label "a" ."#,
        )
        .unwrap();
    }

    fn action(source: &Path, target: &Path, query: &str) -> SparqlAction {
        SparqlAction {
            source: Some(source.display().to_string()),
            includes: Some(vec!["*.ttl".to_string()]),
            excludes: None,
            target: Some(target.display().to_string()),
            query: Some(query.to_string()),
            queries: None,
            format: None,
            endpoint: None,
            each_file: None,
            message: None,
        }
    }

    #[test]
    fn test_select_writes_csv_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a.ttl");
        let out = tmp.path().join("labels.csv");
        let spec = action(
            tmp.path(),
            &out,
            "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
             SELECT ?label WHERE {{ ?s rdfs:label ?label }}",
        );
        run(&spec, &context()).unwrap();
        let csv = fs::read_to_string(&out).unwrap();
        assert!(csv.starts_with("label"));
        assert!(csv.contains("a"));
    }

    #[test]
    fn test_update_rewrites_target() {
        let tmp = tempfile::tempdir().unwrap();
        write_data(tmp.path(), "a.ttl");
        let out = tmp.path().join("updated.ttl");
        let spec = action(
            tmp.path(),
            &out,
            "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
             INSERT {{ ?s rdfs:comment \"generated\" }} WHERE {{ ?s rdfs:label ?l }}",
        );
        run(&spec, &context()).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("generated"));
    }

    #[test]
    fn test_each_file_mode_produces_one_artifact_per_input() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir(&src).unwrap();
        write_data(&src, "a.ttl");
        write_data(&src, "b.ttl");
        let out_dir = tmp.path().join("out");

        let mut spec = action(
            &src,
            &out_dir,
            "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
             SELECT ?label WHERE {{ ?s rdfs:label ?label }}",
        );
        spec.each_file = Some(crate::bundle::TemplatedBool::Flag(true));
        run(&spec, &context()).unwrap();

        assert!(out_dir.join("a.ttl").exists());
        assert!(out_dir.join("b.ttl").exists());
    }
}
