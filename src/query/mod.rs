//! SPARQL query execution.
//!
//! One abstraction covers SELECT/ASK/CONSTRUCT/UPDATE against either the
//! in-memory graph model or a remote endpoint. Queries arrive as inline
//! text, a file path, or an ordered file set; the reference is
//! template-resolved, file contents are used verbatim.

pub mod endpoint;
pub mod sparql_action;

use once_cell::sync::Lazy;
use oxigraph::model::Term;
use oxigraph::sparql::{Query, QueryResults, Update};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bundle::variables::VariableContext;
use crate::bundle::{QueryFileSet, fileset};
use crate::error::{BundleError, Result};
use crate::graph::GraphModel;

/// The four supported query forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum QueryForm {
    Select,
    Ask,
    Construct,
    Update,
}

/// A query with the label it is reported under (file path or "inline").
#[derive(Debug, Clone)]
pub struct NamedQuery {
    pub label: String,
    pub text: String,
}

/// Typed result of a local query execution.
pub enum QueryOutcome {
    /// SELECT: column order follows the query projection.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Option<Term>>>,
    },
    Boolean(bool),
    /// CONSTRUCT result as a fresh model.
    Graph(GraphModel),
    /// UPDATE ran; the caller decides whether to re-serialize.
    Updated,
}

static FORM_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(select|ask|construct|describe)\b").expect("keyword pattern"));

/// Blank out comments, IRIs and string literals so keyword scanning cannot
/// be fooled by their contents.
fn scannable_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_iri = false;
    let mut in_string: Option<char> = None;
    while let Some(c) = chars.next() {
        match c {
            '<' if in_string.is_none() && !in_iri => {
                in_iri = true;
                out.push(' ');
            }
            '>' if in_iri => {
                in_iri = false;
                out.push(' ');
            }
            '"' | '\'' if !in_iri => {
                match in_string {
                    Some(quote) if quote == c => in_string = None,
                    None => in_string = Some(c),
                    _ => {}
                }
                out.push(' ');
            }
            '#' if !in_iri && in_string.is_none() => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ if in_iri || in_string.is_some() => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

/// Classify a query, validating its syntax in the process.
pub fn detect_form(label: &str, text: &str) -> Result<QueryForm> {
    match Query::parse(text, None) {
        Ok(_) => {
            let scannable = scannable_text(text);
            let keyword = FORM_KEYWORD
                .find(&scannable)
                .map(|m| m.as_str().to_ascii_lowercase());
            match keyword.as_deref() {
                Some("select") => Ok(QueryForm::Select),
                Some("ask") => Ok(QueryForm::Ask),
                Some("construct") => Ok(QueryForm::Construct),
                Some("describe") => Err(BundleError::query(
                    label,
                    "local graph",
                    "DESCRIBE queries are not supported",
                )),
                _ => Err(BundleError::query(
                    label,
                    "local graph",
                    "cannot determine query form",
                )),
            }
        }
        Err(query_error) => {
            if Update::parse(text, None).is_ok() {
                Ok(QueryForm::Update)
            } else {
                Err(BundleError::query(label, "local graph", query_error))
            }
        }
    }
}

/// Expand a query specification into an ordered list of named queries.
///
/// An inline `query` whose resolved text names an existing file is read
/// from that file; a `queries` file set is path-sorted before reading.
pub fn build_query_list(
    query: &Option<String>,
    queries: &Option<QueryFileSet>,
    context: &VariableContext,
) -> Result<Vec<NamedQuery>> {
    if let Some(reference) = query {
        let resolved = context.resolve_str(reference)?;
        let path = Path::new(&resolved);
        if path.is_file() {
            let text = fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
            return Ok(vec![NamedQuery {
                label: resolved.clone(),
                text,
            }]);
        }
        return Ok(vec![NamedQuery {
            label: "inline".to_string(),
            text: resolved,
        }]);
    }
    if let Some(set) = queries {
        let pairs = fileset::resolve(&set.as_file_set(), context, true)?;
        let mut list = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let text =
                fs::read_to_string(&pair.input).map_err(|e| BundleError::io(&pair.input, e))?;
            list.push(NamedQuery {
                label: pair.input.display().to_string(),
                text,
            });
        }
        return Ok(list);
    }
    Err(BundleError::Configuration(
        "no queries specified".to_string(),
    ))
}

/// Execute one query against the local graph model.
pub fn execute_local(model: &GraphModel, query: &NamedQuery) -> Result<QueryOutcome> {
    let form = detect_form(&query.label, &query.text)?;
    tracing::debug!(query = %query.label, %form, "executing local query");

    if form == QueryForm::Update {
        model
            .update(&query.text)
            .map_err(|e| BundleError::query(&query.label, "local graph", e))?;
        return Ok(QueryOutcome::Updated);
    }

    let results = model
        .query(&query.text)
        .map_err(|e| BundleError::query(&query.label, "local graph", e))?;
    match results {
        QueryResults::Solutions(solutions) => {
            let columns: Vec<String> = solutions
                .variables()
                .iter()
                .map(|v| v.as_str().to_string())
                .collect();
            let mut rows = Vec::new();
            for solution in solutions {
                let solution =
                    solution.map_err(|e| BundleError::query(&query.label, "local graph", e))?;
                rows.push(
                    columns
                        .iter()
                        .map(|column| solution.get(column.as_str()).cloned())
                        .collect(),
                );
            }
            Ok(QueryOutcome::Rows { columns, rows })
        }
        QueryResults::Boolean(value) => Ok(QueryOutcome::Boolean(value)),
        QueryResults::Graph(triples) => {
            let constructed = GraphModel::new()?;
            for triple in triples {
                let triple =
                    triple.map_err(|e| BundleError::query(&query.label, "local graph", e))?;
                constructed.add_triple(triple)?;
            }
            Ok(QueryOutcome::Graph(constructed))
        }
    }
}

/// Plain-text form of a term for tabular output: bare IRI, literal value.
pub fn term_to_string(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => format!("_:{}", node.as_str()),
        Term::Literal(literal) => literal.value().to_string(),
        other => other.to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Serialize SELECT results as CSV, one header row then one row per match.
pub fn write_select_csv<W: Write>(
    mut writer: W,
    columns: &[String],
    rows: &[Vec<Option<Term>>],
) -> std::io::Result<()> {
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    writeln!(writer, "{}", header.join(","))?;
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|term| {
                term.as_ref()
                    .map(|t| csv_field(&term_to_string(t)))
                    .unwrap_or_default()
            })
            .collect();
        writeln!(writer, "{}", fields.join(","))?;
    }
    Ok(())
}

/// SELECT results rendered to a CSV string, for logging and artifacts.
pub fn select_csv_string(columns: &[String], rows: &[Vec<Option<Term>>]) -> String {
    let mut buffer = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = write_select_csv(&mut buffer, columns, rows);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Where a query's artifact goes: `target` itself for a single query, one
/// file per query (named after the query file stem) for several.
pub fn output_file_name(target: &Path, query_count: usize, label: &str, suffix: &str) -> PathBuf {
    if query_count == 1 {
        target.to_path_buf()
    } else {
        let stem = Path::new(label)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("query");
        target.join(format!("{stem}.{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn context() -> VariableContext {
        VariableContext::resolve(&IndexMap::new(), &[]).unwrap()
    }

    const DATA: &str = r#"
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://example.com/a> rdfs:label "a" .
        <http://example.com/b> rdfs:label "b" .
    "#;

    fn model() -> GraphModel {
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(DATA).unwrap();
        model
    }

    #[test]
    fn test_detect_form() {
        assert_eq!(
            detect_form("inline", "SELECT ?s WHERE { ?s ?p ?o }").unwrap(),
            QueryForm::Select
        );
        assert_eq!(
            detect_form("inline", "ASK { ?s ?p ?o }").unwrap(),
            QueryForm::Ask
        );
        assert_eq!(
            detect_form("inline", "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }").unwrap(),
            QueryForm::Construct
        );
        assert_eq!(
            detect_form(
                "inline",
                "DELETE { ?s ?p ?o } WHERE { ?s ?p ?o }"
            )
            .unwrap(),
            QueryForm::Update
        );
    }

    #[test]
    fn test_detect_form_ignores_prologue_and_comments() {
        let query = "# find select candidates\n\
                     PREFIX ask: <http://example.com/construct#>\n\
                     SELECT ?s WHERE { ?s ?p ?o }";
        assert_eq!(detect_form("inline", query).unwrap(), QueryForm::Select);
    }

    #[test]
    fn test_malformed_query_is_query_execution_error() {
        let err = detect_form("inline", "SELECT WHERE {").expect_err("must fail");
        assert!(matches!(err, BundleError::QueryExecution { .. }));
    }

    #[test]
    fn test_select_rows_preserve_projection_order() {
        let query = NamedQuery {
            label: "inline".to_string(),
            text: "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
                   SELECT ?label ?entity WHERE { ?entity rdfs:label ?label } ORDER BY ?label"
                .to_string(),
        };
        match execute_local(&model(), &query).unwrap() {
            QueryOutcome::Rows { columns, rows } => {
                assert_eq!(columns, vec!["label", "entity"]);
                assert_eq!(rows.len(), 2);
            }
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn test_update_mutates_model() {
        let graph = model();
        let query = NamedQuery {
            label: "inline".to_string(),
            text: "DELETE { ?s ?p ?o } WHERE { ?s ?p ?o }".to_string(),
        };
        match execute_local(&graph, &query).unwrap() {
            QueryOutcome::Updated => {}
            _ => panic!("expected update"),
        }
        assert!(graph.is_empty());
    }

    #[test]
    fn test_construct_builds_new_graph() {
        let query = NamedQuery {
            label: "inline".to_string(),
            text: "CONSTRUCT { ?s a <http://example.com/Labeled> } WHERE { ?s ?p ?o }"
                .to_string(),
        };
        match execute_local(&model(), &query).unwrap() {
            QueryOutcome::Graph(constructed) => assert_eq!(constructed.len(), 2),
            _ => panic!("expected graph"),
        }
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_inline_query_list() {
        let list = build_query_list(
            &Some("SELECT ?s WHERE { ?s ?p ?o }".to_string()),
            &None,
            &context(),
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label, "inline");
    }

    #[test]
    fn test_query_file_set_is_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b_check.rq", "a_check.rq"] {
            fs::write(tmp.path().join(name), "ASK { ?s ?p ?o }").unwrap();
        }
        let list = build_query_list(
            &None,
            &Some(QueryFileSet {
                source: tmp.path().display().to_string(),
                includes: Some(vec!["*.rq".to_string()]),
                excludes: None,
            }),
            &context(),
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].label.ends_with("a_check.rq"));
        assert!(list[1].label.ends_with("b_check.rq"));
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name(Path::new("out.csv"), 1, "whatever", "csv"),
            PathBuf::from("out.csv")
        );
        assert_eq!(
            output_file_name(Path::new("out"), 3, "queries/check_labels.rq", "csv"),
            PathBuf::from("out/check_labels.csv")
        );
    }
}
