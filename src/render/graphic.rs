//! The `graph` action: render a schema-level picture of the loaded
//! ontologies.
//!
//! Rasterization is out of scope; the built-in renderer emits GraphViz
//! `.dot` files behind the [`GraphRenderer`] seam so another renderer can
//! be substituted.

use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{NamedNode, Subject, Term};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::variables::VariableContext;
use crate::bundle::{GraphAction, fileset};
use crate::error::{BundleError, Result};
use crate::graph::GraphModel;
use crate::graph::vocab::owl;

/// Schema-level summary of a graph: classes, their datatype attributes and
/// the object-property edges between them.
#[derive(Debug, Default)]
pub struct SchemaSummary {
    pub classes: Vec<String>,
    /// (class, attribute) pairs from datatype-property domains.
    pub attributes: Vec<(String, String)>,
    /// (domain, property, range) triples from object-property declarations.
    pub edges: Vec<(String, String, String)>,
}

impl SchemaSummary {
    pub fn from_graph(model: &GraphModel) -> Result<Self> {
        let mut summary = SchemaSummary::default();

        for quad in model.quads_matching(None, Some(rdf::TYPE), Some(owl::CLASS.into()))? {
            if let Subject::NamedNode(class) = &quad.subject {
                let label = label_of(model, class)?;
                if !summary.classes.contains(&label) {
                    summary.classes.push(label);
                }
            }
        }
        summary.classes.sort();

        for quad in
            model.quads_matching(None, Some(rdf::TYPE), Some(owl::OBJECT_PROPERTY.into()))?
        {
            let Subject::NamedNode(property) = &quad.subject else {
                continue;
            };
            let name = label_of(model, property)?;
            for domain in objects_of(model, property, rdfs::DOMAIN)? {
                for range in objects_of(model, property, rdfs::RANGE)? {
                    summary.edges.push((
                        label_of(model, &domain)?,
                        name.clone(),
                        label_of(model, &range)?,
                    ));
                }
            }
        }
        summary.edges.sort();

        for quad in
            model.quads_matching(None, Some(rdf::TYPE), Some(owl::DATATYPE_PROPERTY.into()))?
        {
            let Subject::NamedNode(property) = &quad.subject else {
                continue;
            };
            let name = label_of(model, property)?;
            for domain in objects_of(model, property, rdfs::DOMAIN)? {
                summary
                    .attributes
                    .push((label_of(model, &domain)?, name.clone()));
            }
        }
        summary.attributes.sort();

        Ok(summary)
    }
}

fn objects_of(
    model: &GraphModel,
    subject: &NamedNode,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> Result<Vec<NamedNode>> {
    Ok(model
        .quads_matching(Some(subject.as_ref().into()), Some(predicate), None)?
        .into_iter()
        .filter_map(|quad| match quad.object {
            Term::NamedNode(node) => Some(node),
            _ => None,
        })
        .collect())
}

fn label_of(model: &GraphModel, node: &NamedNode) -> Result<String> {
    for quad in model.quads_matching(Some(node.as_ref().into()), Some(rdfs::LABEL), None)? {
        if let Term::Literal(literal) = quad.object {
            return Ok(literal.value().to_string());
        }
    }
    Ok(local_name(node.as_str()))
}

fn local_name(iri: &str) -> String {
    iri.rsplit(['#', '/']).next().unwrap_or(iri).to_string()
}

/// Something that can turn a schema summary into files on disk.
pub trait GraphRenderer {
    fn render(
        &self,
        summary: &SchemaSummary,
        out_dir: &Path,
        title: &str,
        version: &str,
        compact: bool,
    ) -> Result<PathBuf>;
}

/// GraphViz dot output. In compact mode only class nodes and edges are
/// drawn; otherwise each class lists its datatype attributes.
pub struct DotRenderer;

impl GraphRenderer for DotRenderer {
    fn render(
        &self,
        summary: &SchemaSummary,
        out_dir: &Path,
        title: &str,
        version: &str,
        compact: bool,
    ) -> Result<PathBuf> {
        let mut dot = String::new();
        dot.push_str(&format!("digraph \"{}\" {{\n", escape(title)));
        dot.push_str(&format!(
            "  label=\"{} {}\";\n  rankdir=LR;\n  node [shape=record];\n",
            escape(title),
            escape(version)
        ));

        for class in &summary.classes {
            if compact {
                dot.push_str(&format!("  \"{}\";\n", escape(class)));
            } else {
                let attributes: Vec<&str> = summary
                    .attributes
                    .iter()
                    .filter(|(owner, _)| owner == class)
                    .map(|(_, attribute)| attribute.as_str())
                    .collect();
                dot.push_str(&format!(
                    "  \"{}\" [label=\"{{{}|{}}}\"];\n",
                    escape(class),
                    escape(class),
                    escape(&attributes.join("\\l"))
                ));
            }
        }
        for (from, property, to) in &summary.edges {
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape(from),
                escape(to),
                escape(property)
            ));
        }
        dot.push_str("}\n");

        let path = out_dir.join(format!("{title}_{version}.dot"));
        fs::write(&path, dot).map_err(|e| BundleError::io(&path, e))?;
        Ok(path)
    }
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}

pub fn run(action: &GraphAction, context: &VariableContext) -> Result<()> {
    let out_dir = PathBuf::from(context.resolve_str(&action.target)?);
    fs::create_dir_all(&out_dir).map_err(|e| BundleError::io(&out_dir, e))?;
    let title = context.resolve_str(&action.title)?;
    let version = context.resolve_str(&action.version)?;

    let mut model = GraphModel::new()?;
    let pairs = fileset::resolve(&action.input_set(), context, true)?;
    model.load_files(pairs.iter().map(|pair| pair.input.as_path()))?;

    let summary = SchemaSummary::from_graph(&model)?;
    let rendered = DotRenderer.render(&summary, &out_dir, &title, &version, action.compact)?;
    tracing::info!(output = %rendered.display(), "rendered schema graphic");
    Ok(())
}
