//! Violation report rendering.
//!
//! Validation reports (constructed by queries or by the SHACL validator)
//! are summarized as a plain-text table, column widths fitted to the
//! longest value and rows sorted by focus node, before being logged.

use oxigraph::sparql::QueryResults;

use super::Severity;
use crate::error::{BundleError, Result};
use crate::graph::GraphModel;
use crate::graph::vocab::sh;
use crate::query::term_to_string;

const REPORT_QUERY: &str = r#"
    PREFIX sh: <http://www.w3.org/ns/shacl#>
    SELECT ?focus ?path ?value ?component ?severity ?message WHERE {
        ?violation
           sh:focusNode ?focus ;
           sh:resultMessage ?message ;
           sh:resultSeverity ?severity .
        OPTIONAL { ?violation sh:value ?value }
        OPTIONAL { ?violation sh:resultPath ?path }
        OPTIONAL { ?violation sh:sourceConstraintComponent ?component }
    }
"#;

const MESSAGE_WIDTH: usize = 50;

/// Rendered summary of a validation report graph.
pub struct ReportSummary {
    pub table: String,
    /// Well-formed result rows found in the graph.
    pub rows: usize,
    /// Whether any row carries `sh:Violation` severity.
    pub violation: bool,
}

impl ReportSummary {
    /// Whether the verdict fails under the given threshold.
    pub fn fails(&self, fail_on_warning: bool) -> bool {
        self.violation || fail_on_warning
    }
}

fn shorten(iri: &str) -> String {
    match iri.strip_prefix(sh::NS) {
        Some(local) => format!("sh:{local}"),
        None => iri.to_string(),
    }
}

/// Summarize a report graph as a width-fitted table.
pub fn format_validation_results(report: &GraphModel) -> Result<ReportSummary> {
    let results = report
        .query(REPORT_QUERY)
        .map_err(|e| BundleError::query("validation report", "local graph", e))?;
    let QueryResults::Solutions(solutions) = results else {
        return Err(BundleError::query(
            "validation report",
            "local graph",
            "report query did not return solutions",
        ));
    };

    let headers = ["Focus", "Path", "Value", "Severity", "Message"];
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    let mut rows: Vec<[String; 5]> = Vec::new();
    let mut violation = false;

    for solution in solutions {
        let solution =
            solution.map_err(|e| BundleError::query("validation report", "local graph", e))?;
        let mut message = solution
            .get("message")
            .map(term_to_string)
            .unwrap_or_default();
        if message.chars().count() > MESSAGE_WIDTH {
            let clipped: String = message.chars().take(MESSAGE_WIDTH - 3).collect();
            message = format!("{clipped}...");
        }
        let severity = solution
            .get("severity")
            .map(term_to_string)
            .unwrap_or_default();
        let severity = shorten(&severity);
        violation |= severity == "sh:Violation";

        let row = [
            solution.get("focus").map(term_to_string).unwrap_or_default(),
            solution
                .get("path")
                .or_else(|| solution.get("component"))
                .map(term_to_string)
                .map(|v| shorten(&v))
                .unwrap_or_default(),
            solution.get("value").map(term_to_string).unwrap_or_default(),
            severity,
            message,
        ];
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
        rows.push(row);
    }
    rows.sort_by(|a, b| a[0].cmp(&b[0]));

    let mut table = String::new();
    render_row(&mut table, &widths, &headers.map(String::from));
    for row in &rows {
        render_row(&mut table, &widths, row);
    }

    Ok(ReportSummary {
        table,
        rows: rows.len(),
        violation,
    })
}

fn render_row(out: &mut String, widths: &[usize], cells: &[String; 5]) {
    let mut first = true;
    for (width, cell) in widths.iter().zip(cells.iter()) {
        if !first {
            out.push(' ');
        }
        first = false;
        let mut clipped: String = cell.chars().take(*width).collect();
        let mut length = clipped.chars().count();
        while length < *width {
            clipped.push(' ');
            length += 1;
        }
        out.push_str(&clipped);
    }
    out.push('\n');
}

/// Map a severity IRI onto the threshold ladder, defaulting to the most
/// severe when unrecognized.
pub fn severity_from_iri(iri: &str) -> Severity {
    if iri == sh::INFO.as_str() {
        Severity::Info
    } else if iri == sh::WARNING.as_str() {
        Severity::Warning
    } else {
        Severity::Violation
    }
}
