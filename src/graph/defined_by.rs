//! `rdfs:isDefinedBy` annotation.
//!
//! Strict mode annotates class, object/datatype/annotation property and
//! named-individual resources; `all` mode annotates every non-blank subject
//! that carries at least one property besides `rdf:type`. Pre-existing
//! annotations are replaced unless `retain` is set.

use oxigraph::model::vocab::{rdf, rdfs};
use oxigraph::model::{NamedNode, NamedNodeRef, Subject, Term};
use std::fs;

use super::vocab::owl;
use super::{GraphModel, guess_format, output_format_for};
use crate::bundle::variables::VariableContext;
use crate::bundle::{DefinedByAction, DefinedByMode, fileset, resolve_flag};
use crate::error::{BundleError, Result};

const STRICT_TYPES: [NamedNodeRef<'static>; 6] = [
    owl::CLASS,
    owl::OBJECT_PROPERTY,
    owl::DATATYPE_PROPERTY,
    owl::ANNOTATION_PROPERTY,
    owl::NAMED_INDIVIDUAL,
    owl::THING,
];

impl GraphModel {
    /// Annotate the model, requiring exactly one declared ontology.
    pub fn apply_defined_by(
        &self,
        mode: DefinedByMode,
        retain_existing: bool,
        versioned: bool,
        scope: &str,
    ) -> Result<()> {
        let ontology = self.single_ontology(scope)?;
        self.annotate_defined_by(&ontology, mode, retain_existing, versioned)
    }

    /// Annotate against an already-identified ontology resource.
    pub(crate) fn annotate_defined_by(
        &self,
        ontology: &NamedNode,
        mode: DefinedByMode,
        retain_existing: bool,
        versioned: bool,
    ) -> Result<()> {
        let mut target = ontology.clone();
        if versioned {
            for quad in self.quads_matching(
                Some(ontology.as_ref().into()),
                Some(owl::VERSION_IRI),
                None,
            )? {
                if let Term::NamedNode(version) = quad.object {
                    target = version;
                    break;
                }
            }
        }

        for subject in self.defined_subjects(mode)? {
            if subject.as_str() == target.as_str() || subject.as_str() == ontology.as_str() {
                continue;
            }
            let existing = self.quads_matching(
                Some(subject.as_ref().into()),
                Some(rdfs::IS_DEFINED_BY),
                None,
            )?;
            if existing.is_empty() {
                tracing::debug!(subject = %subject, "adding definedBy");
                self.add(subject.clone(), rdfs::IS_DEFINED_BY, target.clone())?;
                continue;
            }
            for quad in existing {
                if quad.object == Term::NamedNode(target.clone()) {
                    continue;
                }
                if retain_existing {
                    tracing::warn!(
                        subject = %subject,
                        defined_by = %quad.object,
                        expected = %target,
                        "subject defined by another ontology"
                    );
                } else {
                    tracing::debug!(subject = %subject, "replacing definedBy");
                    self.remove_quad(&quad)?;
                    self.add(subject.clone(), rdfs::IS_DEFINED_BY, target.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Non-blank subjects eligible for annotation under the given mode.
    fn defined_subjects(&self, mode: DefinedByMode) -> Result<Vec<NamedNode>> {
        let mut subjects = Vec::new();
        let mut push = |subject: &Subject| {
            if let Subject::NamedNode(node) = subject {
                if !subjects.contains(node) {
                    subjects.push(node.clone());
                }
            }
        };

        match mode {
            DefinedByMode::Strict => {
                for declared_type in STRICT_TYPES {
                    for quad in
                        self.quads_matching(None, Some(rdf::TYPE), Some(declared_type.into()))?
                    {
                        push(&quad.subject);
                    }
                }
            }
            DefinedByMode::All => {
                for quad in self.quads_matching(None, Some(rdf::TYPE), None)? {
                    if quad.object != Term::NamedNode(owl::ONTOLOGY.into_owned()) {
                        push(&quad.subject);
                    }
                }
            }
        }

        subjects.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        // Only subjects with at least one non-type property qualify.
        let mut qualified = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let has_other_property = self
                .quads_matching(Some(subject.as_ref().into()), None, None)?
                .iter()
                .any(|quad| quad.predicate.as_ref() != rdf::TYPE);
            if has_other_property {
                qualified.push(subject);
            }
        }
        Ok(qualified)
    }
}

/// Run a standalone `definedBy` action over its file set.
///
/// Inputs without exactly one ontology declaration are copied through
/// unchanged with a warning, matching the permissive per-file semantics of
/// the action (the export path is strict instead).
pub fn run(action: &DefinedByAction, context: &VariableContext) -> Result<()> {
    let mode = action.mode.unwrap_or(DefinedByMode::Strict);
    let retain = resolve_flag(&action.retain_defined_by, context, false)?;
    let versioned = resolve_flag(&action.versioned_defined_by, context, false)?;

    for pair in fileset::resolve(&action.files, context, false)? {
        let output = pair.output.as_ref().ok_or_else(|| {
            BundleError::Configuration("definedBy requires a target".to_string())
        })?;
        let mut model = GraphModel::new()?;
        model.load_file(&pair.input)?;

        let ontologies = model.ontologies()?;
        match ontologies.as_slice() {
            [ontology] => {
                model.annotate_defined_by(ontology, mode, retain, versioned)?;
                let format = guess_format(&pair.input)
                    .map(output_format_for)
                    .unwrap_or(super::OutputFormat::Turtle);
                model.write_file(output, format, false)?;
            }
            [] => {
                tracing::warn!(
                    input = %pair.input.display(),
                    "no ontology found, copying unchanged"
                );
                fs::copy(&pair.input, output).map_err(|e| BundleError::io(output, e))?;
            }
            _ => {
                tracing::warn!(
                    input = %pair.input.display(),
                    count = ontologies.len(),
                    "multiple ontologies found, copying unchanged"
                );
                fs::copy(&pair.input, output).map_err(|e| BundleError::io(output, e))?;
            }
        }

        if let Some(replace) = &action.files.replace {
            fileset::Replacement::compile(replace, context)?.apply_to_file(output)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONTOLOGY: &str = r#"
        @prefix owl: <http://www.w3.org/2002/07/owl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://example.com/ont> a owl:Ontology ;
            owl:versionIRI <http://example.com/ont1.0.0> .
        <http://example.com/Widget> a owl:Class ; rdfs:label "Widget" .
        <http://example.com/hasPart> a owl:ObjectProperty ; rdfs:label "has part" .
        <http://example.com/bare> a owl:Class .
        <http://example.com/note> a <http://example.com/Annotation> ; rdfs:label "note" .
    "#;

    fn model() -> GraphModel {
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(ONTOLOGY).unwrap();
        model
    }

    fn defined_by_pairs(model: &GraphModel) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = model
            .quads_matching(None, Some(rdfs::IS_DEFINED_BY), None)
            .unwrap()
            .into_iter()
            .map(|q| (q.subject.to_string(), q.object.to_string()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_strict_annotates_owl_entities_with_properties() {
        let model = model();
        model
            .apply_defined_by(DefinedByMode::Strict, false, false, "test")
            .unwrap();
        let pairs = defined_by_pairs(&model);
        // `bare` has no non-type property; `note` is not an OWL entity type.
        assert_eq!(
            pairs,
            vec![
                (
                    "<http://example.com/Widget>".to_string(),
                    "<http://example.com/ont>".to_string()
                ),
                (
                    "<http://example.com/hasPart>".to_string(),
                    "<http://example.com/ont>".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_all_mode_annotates_every_typed_subject() {
        let model = model();
        model
            .apply_defined_by(DefinedByMode::All, false, false, "test")
            .unwrap();
        let pairs = defined_by_pairs(&model);
        assert_eq!(pairs.len(), 3, "Widget, hasPart and note: {pairs:?}");
    }

    #[test]
    fn test_strict_annotation_is_idempotent() {
        let model = model();
        model
            .apply_defined_by(DefinedByMode::Strict, false, false, "test")
            .unwrap();
        let first = defined_by_pairs(&model);
        let count = model.len();
        model
            .apply_defined_by(DefinedByMode::Strict, false, false, "test")
            .unwrap();
        assert_eq!(defined_by_pairs(&model), first);
        assert_eq!(model.len(), count);
    }

    #[test]
    fn test_replace_rewrites_foreign_annotation() {
        let model = model();
        let widget = NamedNode::new("http://example.com/Widget").unwrap();
        let foreign = NamedNode::new("http://example.com/other").unwrap();
        model
            .add(widget.clone(), rdfs::IS_DEFINED_BY, foreign.clone())
            .unwrap();

        model
            .apply_defined_by(DefinedByMode::Strict, false, false, "test")
            .unwrap();
        let pairs = defined_by_pairs(&model);
        assert!(pairs
            .iter()
            .all(|(_, object)| object == "<http://example.com/ont>"));

        // With retain, a fresh foreign annotation survives.
        model
            .add(widget, rdfs::IS_DEFINED_BY, foreign)
            .unwrap();
        model
            .apply_defined_by(DefinedByMode::Strict, true, false, "test")
            .unwrap();
        assert!(defined_by_pairs(&model)
            .iter()
            .any(|(_, object)| object == "<http://example.com/other>"));
    }

    #[test]
    fn test_versioned_defined_by_uses_version_iri() {
        let model = model();
        model
            .apply_defined_by(DefinedByMode::Strict, false, true, "test")
            .unwrap();
        assert!(defined_by_pairs(&model)
            .iter()
            .all(|(_, object)| object == "<http://example.com/ont1.0.0>"));
    }
}
