//! The `export` action: combine a file set into one serialized artifact,
//! optionally stripping import versions, merging to a single ontology and
//! annotating `rdfs:isDefinedBy`.

use std::path::Path;

use super::{GraphModel, OutputFormat};
use crate::bundle::variables::VariableContext;
use crate::bundle::{DefinedByMode, ExportAction, fileset, resolve_flag};
use crate::error::{BundleError, Result};

pub fn run(action: &ExportAction, context: &VariableContext) -> Result<()> {
    let target = context.resolve_str(&action.target)?;
    let compress = resolve_flag(&action.compress, context, false)?;
    let format_name = action
        .format
        .as_ref()
        .map(|format| context.resolve_str(format))
        .transpose()?;
    let format = OutputFormat::from_option(format_name.as_deref())?;

    let graph_context = action
        .context
        .as_ref()
        .map(|iri| context.resolve_str(iri))
        .transpose()?;
    let mut model = match &graph_context {
        Some(iri) => GraphModel::with_context(iri)?,
        None => GraphModel::new()?,
    };

    let scope = context.resolve_str(&action.source)?;
    let pairs = fileset::resolve(&action.input_set(), context, true)?;
    model.load_files(pairs.iter().map(|pair| pair.input.as_path()))?;
    tracing::debug!(triples = model.len(), source = %scope, "export graph assembled");

    if resolve_flag(&action.strip_versions, context, false)? {
        model.strip_import_versions()?;
    }

    if let Some(merge) = &action.merge {
        let iri = context.resolve_str(&merge.iri)?;
        let version = context.resolve_str(&merge.version)?;
        model.merge_into(&iri, &version)?;
    }

    if let Some(defined_by) = &action.defined_by {
        let mode_name = context.resolve_str(defined_by)?;
        let mode: DefinedByMode = mode_name.parse().map_err(|_| {
            BundleError::Configuration(format!("unsupported definedBy mode '{mode_name}'"))
        })?;
        let retain = resolve_flag(&action.retain_defined_by, context, false)?;
        let versioned = resolve_flag(&action.versioned_defined_by, context, false)?;
        model.apply_defined_by(mode, retain, versioned, &scope)?;
    }

    model.write_file(Path::new(&target), format, compress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::fs;

    fn context() -> VariableContext {
        VariableContext::resolve(&IndexMap::new(), &[]).unwrap()
    }

    fn write_module(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_export_merges_and_annotates() {
        let tmp = tempfile::tempdir().unwrap();
        write_module(
            tmp.path(),
            "a.ttl",
            r#"@prefix owl: <http://www.w3.org/2002/07/owl#> .
               @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
               <http://example.com/a> a owl:Ontology ;
                   owl:imports <http://example.com/b> .
               <http://example.com/Widget> a owl:Class ; rdfs:label "Widget" ."#,
        );
        write_module(
            tmp.path(),
            "b.ttl",
            r#"@prefix owl: <http://www.w3.org/2002/07/owl#> .
               @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
               <http://example.com/b> a owl:Ontology ;
                   owl:imports <http://example.com/external> .
               <http://example.com/Part> a owl:Class ; rdfs:label "Part" ."#,
        );
        let out = tmp.path().join("merged.ttl");

        let action = ExportAction {
            source: tmp.path().display().to_string(),
            includes: Some(vec!["*.ttl".to_string()]),
            excludes: None,
            target: out.display().to_string(),
            format: None,
            context: None,
            compress: None,
            merge: Some(crate::bundle::MergeSpec {
                iri: "http://example.com/merged".to_string(),
                version: "1.0.0".to_string(),
            }),
            defined_by: Some("strict".to_string()),
            strip_versions: None,
            retain_defined_by: None,
            versioned_defined_by: None,
            message: None,
        };
        run(&action, &context()).unwrap();

        let mut merged = GraphModel::new().unwrap();
        merged.load_file(&out).unwrap();
        assert_eq!(merged.ontologies().unwrap().len(), 1);

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("http://example.com/external"));
        assert!(text.contains("isDefinedBy"));
    }

    #[test]
    fn test_export_zero_ontologies_with_defined_by_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_module(tmp.path(), "plain.ttl", "<urn:a> <urn:b> <urn:c> .");
        let action = ExportAction {
            source: tmp.path().join("plain.ttl").display().to_string(),
            includes: None,
            excludes: None,
            target: tmp.path().join("out.ttl").display().to_string(),
            format: None,
            context: None,
            compress: None,
            merge: None,
            defined_by: Some("strict".to_string()),
            strip_versions: None,
            retain_defined_by: None,
            versioned_defined_by: None,
            message: None,
        };
        assert!(matches!(
            run(&action, &context()),
            Err(BundleError::GraphStructure { .. })
        ));
    }

    #[test]
    fn test_export_with_context_emits_nquads() {
        let tmp = tempfile::tempdir().unwrap();
        write_module(
            tmp.path(),
            "a.ttl",
            "<http://example.com/s> <http://example.com/p> <http://example.com/o> .",
        );
        let out = tmp.path().join("out.nq");
        let action = ExportAction {
            source: tmp.path().join("a.ttl").display().to_string(),
            includes: None,
            excludes: None,
            target: out.display().to_string(),
            format: None,
            context: Some("http://example.com/graph".to_string()),
            compress: None,
            merge: None,
            defined_by: None,
            strip_versions: None,
            retain_defined_by: None,
            versioned_defined_by: None,
            message: None,
        };
        run(&action, &context()).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("<http://example.com/graph>"));
    }
}
