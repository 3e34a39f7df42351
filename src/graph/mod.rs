//! In-memory graph model.
//!
//! [`GraphModel`] wraps an oxigraph [`Store`] holding the union of one or
//! more loaded RDF documents, either in the default graph or, when an
//! export `context` is given, in a single named graph. All graph edits used
//! by merge/definedBy run as quad-pattern walks so they work identically in
//! both placements.

pub mod defined_by;
pub mod export;
pub mod merge;
pub mod vocab;

use flate2::Compression;
use flate2::write::GzEncoder;
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{
    GraphName, GraphNameRef, NamedNode, NamedNodeRef, Quad, Subject, SubjectRef, Term, TermRef,
    Triple,
};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{BundleError, Result};

/// Serialization formats accepted by `export`/`sparql` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Turtle,
    Xml,
    Nt,
    Nquads,
}

impl OutputFormat {
    pub fn rdf_format(&self) -> RdfFormat {
        match self {
            OutputFormat::Turtle => RdfFormat::Turtle,
            OutputFormat::Xml => RdfFormat::RdfXml,
            OutputFormat::Nt => RdfFormat::NTriples,
            OutputFormat::Nquads => RdfFormat::NQuads,
        }
    }

    /// File suffix for per-query CONSTRUCT artifacts.
    pub fn suffix(&self) -> &'static str {
        match self {
            OutputFormat::Turtle => "ttl",
            OutputFormat::Xml => "xml",
            OutputFormat::Nt => "nt",
            OutputFormat::Nquads => "nq",
        }
    }

    /// Parse an already template-resolved format name, defaulting to turtle.
    pub fn from_option(name: Option<&str>) -> Result<Self> {
        match name {
            None => Ok(OutputFormat::Turtle),
            Some(text) => text.parse().map_err(|_| {
                BundleError::Configuration(format!("unsupported serialization format '{text}'"))
            }),
        }
    }
}

/// Guess the parse format of a file from its extension.
pub fn guess_format(path: &Path) -> Option<RdfFormat> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "ttl" | "turtle" => Some(RdfFormat::Turtle),
        "nt" | "ntriples" => Some(RdfFormat::NTriples),
        "nq" | "nquads" => Some(RdfFormat::NQuads),
        "rdf" | "owl" | "xml" => Some(RdfFormat::RdfXml),
        "trig" => Some(RdfFormat::TriG),
        _ => None,
    }
}

/// The output format matching a file's parse format, for in-place rewrites.
pub fn output_format_for(format: RdfFormat) -> OutputFormat {
    match format {
        RdfFormat::NTriples => OutputFormat::Nt,
        RdfFormat::NQuads => OutputFormat::Nquads,
        RdfFormat::RdfXml => OutputFormat::Xml,
        _ => OutputFormat::Turtle,
    }
}

fn storage_error(error: impl std::fmt::Display) -> BundleError {
    BundleError::Configuration(format!("graph storage error: {error}"))
}

pub struct GraphModel {
    store: Store,
    context: Option<NamedNode>,
}

impl GraphModel {
    pub fn new() -> Result<Self> {
        Ok(Self {
            store: Store::new().map_err(storage_error)?,
            context: None,
        })
    }

    /// A model whose triples live in the named graph `iri`.
    pub fn with_context(iri: &str) -> Result<Self> {
        let context = NamedNode::new(iri)
            .map_err(|e| BundleError::Configuration(format!("invalid context IRI '{iri}': {e}")))?;
        Ok(Self {
            store: Store::new().map_err(storage_error)?,
            context: Some(context),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn graph_name(&self) -> GraphName {
        match &self.context {
            Some(node) => GraphName::NamedNode(node.clone()),
            None => GraphName::DefaultGraph,
        }
    }

    fn graph_name_ref(&self) -> GraphNameRef<'_> {
        match &self.context {
            Some(node) => GraphNameRef::NamedNode(node.as_ref()),
            None => GraphNameRef::DefaultGraph,
        }
    }

    /// Load one RDF file, guessing the format from its extension.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let format = guess_format(path).ok_or_else(|| {
            BundleError::Configuration(format!(
                "cannot determine RDF format of {}",
                path.display()
            ))
        })?;
        let file = File::open(path).map_err(|e| BundleError::io(path, e))?;
        // Blank node labels are file-scoped; renaming keeps two loaded
        // files from colliding in the union.
        let parser = RdfParser::from_format(format)
            .without_named_graphs()
            .rename_blank_nodes()
            .with_default_graph(self.graph_name());
        self.store
            .load_from_reader(parser, BufReader::new(file))
            .map_err(|e| {
                BundleError::Configuration(format!("cannot parse {}: {e}", path.display()))
            })?;
        tracing::debug!(path = %path.display(), triples = self.len(), "loaded RDF file");
        Ok(())
    }

    pub fn load_files<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) -> Result<()> {
        for path in paths {
            self.load_file(path)?;
        }
        Ok(())
    }

    /// Load turtle text, used for endpoint CONSTRUCT responses and tests.
    pub fn load_turtle(&mut self, text: &str) -> Result<()> {
        let parser = RdfParser::from_format(RdfFormat::Turtle)
            .without_named_graphs()
            .with_default_graph(self.graph_name());
        self.store
            .load_from_reader(parser, text.as_bytes())
            .map_err(|e| BundleError::Configuration(format!("cannot parse turtle: {e}")))
    }

    pub fn len(&self) -> usize {
        self.store.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn query(
        &self,
        text: &str,
    ) -> std::result::Result<QueryResults, oxigraph::sparql::EvaluationError> {
        self.store.query(text)
    }

    pub fn update(
        &self,
        text: &str,
    ) -> std::result::Result<(), oxigraph::sparql::UpdateEvaluationError> {
        self.store.update(text)
    }

    pub fn add(
        &self,
        subject: impl Into<Subject>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> Result<()> {
        let quad = Quad::new(subject, predicate, object, self.graph_name());
        self.store.insert(&quad).map_err(storage_error)?;
        Ok(())
    }

    pub fn add_triple(&self, triple: Triple) -> Result<()> {
        self.add(triple.subject, triple.predicate, triple.object)
    }

    pub fn remove_quad(&self, quad: &Quad) -> Result<()> {
        self.store.remove(quad).map_err(storage_error)?;
        Ok(())
    }

    /// Collect quads matching a pattern within this model's graph.
    pub fn quads_matching(
        &self,
        subject: Option<SubjectRef<'_>>,
        predicate: Option<NamedNodeRef<'_>>,
        object: Option<TermRef<'_>>,
    ) -> Result<Vec<Quad>> {
        self.store
            .quads_for_pattern(subject, predicate, object, Some(self.graph_name_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_error)
    }

    /// Serialize to a writer. A context model always serializes as N-Quads;
    /// otherwise the requested format is used.
    pub fn serialize_to_writer<W: Write>(&self, writer: W, format: OutputFormat) -> Result<()> {
        match &self.context {
            Some(_) => {
                self.store
                    .dump_to_writer(serializer_for(RdfFormat::NQuads)?, writer)
                    .map_err(|e| {
                        BundleError::Configuration(format!("serialization failed: {e}"))
                    })?;
            }
            None => {
                self.store
                    .dump_graph_to_writer(
                        GraphNameRef::DefaultGraph,
                        serializer_for(format.rdf_format())?,
                        writer,
                    )
                    .map_err(|e| {
                        BundleError::Configuration(format!("serialization failed: {e}"))
                    })?;
            }
        }
        Ok(())
    }

    /// Serialize to a file, optionally gzip-compressed.
    pub fn write_file(&self, path: &Path, format: OutputFormat, compress: bool) -> Result<()> {
        let file = File::create(path).map_err(|e| BundleError::io(path, e))?;
        if compress {
            let encoder = GzEncoder::new(file, Compression::default());
            self.serialize_to_writer(encoder, format)?;
        } else {
            self.serialize_to_writer(BufWriter::new(file), format)?;
        }
        tracing::debug!(path = %path.display(), %format, "wrote graph");
        Ok(())
    }
}

fn serializer_for(format: RdfFormat) -> Result<RdfSerializer> {
    let mut serializer = RdfSerializer::from_format(format);
    for (prefix, iri) in [
        ("owl", "http://www.w3.org/2002/07/owl#"),
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("sh", "http://www.w3.org/ns/shacl#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ] {
        serializer = serializer
            .with_prefix(prefix, iri)
            .map_err(|e| BundleError::Configuration(format!("invalid prefix IRI: {e}")))?;
    }
    Ok(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::vocab::rdf;

    const SAMPLE: &str = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://example.com/ont> a owl:Ontology .
        <http://example.com/Widget> a owl:Class ; rdfs:label "Widget" .
    "#;

    #[test]
    fn test_load_and_count() {
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(SAMPLE).unwrap();
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn test_guess_format_by_extension() {
        assert_eq!(guess_format(Path::new("a.ttl")), Some(RdfFormat::Turtle));
        assert_eq!(guess_format(Path::new("a.owl")), Some(RdfFormat::RdfXml));
        assert_eq!(guess_format(Path::new("a.nt")), Some(RdfFormat::NTriples));
        assert_eq!(guess_format(Path::new("a.nq")), Some(RdfFormat::NQuads));
        assert_eq!(guess_format(Path::new("a.docx")), None);
    }

    #[test]
    fn test_context_model_places_triples_in_named_graph() {
        let mut model = GraphModel::with_context("http://example.com/graph").unwrap();
        model.load_turtle(SAMPLE).unwrap();
        let quads = model
            .quads_matching(None, Some(rdf::TYPE), Some(vocab::owl::ONTOLOGY.into()))
            .unwrap();
        assert_eq!(quads.len(), 1);
        assert_eq!(
            quads[0].graph_name.to_string(),
            "<http://example.com/graph>"
        );
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(SAMPLE).unwrap();
        let mut out = Vec::new();
        model
            .serialize_to_writer(&mut out, OutputFormat::Nt)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<http://example.com/Widget>"));

        let mut reparsed = GraphModel::new().unwrap();
        let parser = RdfParser::from_format(RdfFormat::NTriples);
        reparsed
            .store
            .load_from_reader(parser, text.as_bytes())
            .unwrap();
        assert_eq!(reparsed.len(), model.len());
    }

    #[test]
    fn test_compressed_write() {
        use std::io::Read;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.ttl.gz");
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(SAMPLE).unwrap();
        model.write_file(&path, OutputFormat::Turtle, true).unwrap();

        let file = File::open(&path).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert!(text.contains("Widget"));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(
            OutputFormat::from_option(None).unwrap(),
            OutputFormat::Turtle
        );
        assert_eq!(
            OutputFormat::from_option(Some("xml")).unwrap(),
            OutputFormat::Xml
        );
        assert!(OutputFormat::from_option(Some("docx")).is_err());
    }
}
