//! Ontology discovery and merge.
//!
//! Merging removes every existing `owl:Ontology` declaration from the
//! model, creates a single new ontology resource stamped with a version
//! IRI, and re-parents onto it every import that is not satisfied inside
//! the merge set itself. Import matching ignores trailing semantic-version
//! suffixes so `.../core1.2.3` still counts as the merged `.../core`.

use once_cell::sync::Lazy;
use oxigraph::model::vocab::{rdf, xsd};
use oxigraph::model::{Literal, NamedNode, Subject, Term};
use regex::Regex;
use std::collections::HashSet;

use super::vocab::owl;
use super::GraphModel;
use crate::error::{BundleError, Result};

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)((\d+|[Xx])\.(\d+|[Xx])\.(\d+|[Xx]))?$").expect("version pattern compiles")
});

/// Strip a trailing `1.2.3` (or `X.x.x` placeholder) suffix from an IRI.
fn without_version(iri: &str) -> &str {
    VERSION_SUFFIX
        .captures(iri)
        .and_then(|captures| captures.get(1))
        .map(|base| base.as_str())
        .unwrap_or(iri)
}

impl GraphModel {
    /// All `owl:Ontology` resources declared in the model.
    pub fn ontologies(&self) -> Result<Vec<NamedNode>> {
        let mut found = Vec::new();
        for quad in self.quads_matching(None, Some(rdf::TYPE), Some(owl::ONTOLOGY.into()))? {
            if let Subject::NamedNode(node) = quad.subject {
                if !found.contains(&node) {
                    found.push(node);
                }
            }
        }
        found.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(found)
    }

    /// The single ontology the model must declare.
    ///
    /// Zero or multiple declarations is a fatal structure error; `scope`
    /// names the file set being processed in the report.
    pub fn single_ontology(&self, scope: &str) -> Result<NamedNode> {
        let ontologies = self.ontologies()?;
        match ontologies.len() {
            1 => Ok(ontologies.into_iter().next().expect("len checked")),
            0 => Err(BundleError::GraphStructure {
                scope: scope.to_string(),
                message: "no ontology declaration found".to_string(),
            }),
            n => Err(BundleError::GraphStructure {
                scope: scope.to_string(),
                message: format!(
                    "{n} ontology declarations found where exactly one is required: {}",
                    ontologies
                        .iter()
                        .map(|o| o.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }

    /// Remove all ontology declarations and replace them with one merged
    /// ontology `iri`, stamped with `<iri><version>` as its version IRI.
    ///
    /// Imports pointing outside the merge set transfer to the new ontology;
    /// imports satisfied by a merged module (directly or via their version
    /// IRIs) are dropped.
    pub fn merge_into(&self, iri: &str, version: &str) -> Result<()> {
        let ontology = NamedNode::new(iri)
            .map_err(|e| BundleError::Configuration(format!("invalid merge IRI '{iri}': {e}")))?;

        let ontologies = self.ontologies()?;
        let merged: HashSet<String> = ontologies
            .iter()
            .map(|node| node.as_str().to_string())
            .collect();
        let mut versions: HashSet<String> = HashSet::new();
        for declared in &ontologies {
            for quad in self.quads_matching(
                Some(declared.as_ref().into()),
                Some(owl::VERSION_IRI),
                None,
            )? {
                if let Term::NamedNode(node) = quad.object {
                    versions.insert(node.as_str().to_string());
                }
            }
        }

        // External dependencies to carry over, gathered before removal.
        let mut external = Vec::new();
        for quad in self.quads_matching(None, Some(owl::IMPORTS), None)? {
            if let Term::NamedNode(import) = &quad.object {
                let internally_satisfied = merged.contains(without_version(import.as_str()))
                    || versions.contains(import.as_str());
                if !internally_satisfied && !external.contains(import) {
                    external.push(import.clone());
                }
            }
        }

        for declared in &ontologies {
            tracing::debug!(ontology = %declared, "removing ontology declaration");
            for quad in self.quads_matching(Some(declared.as_ref().into()), None, None)? {
                self.remove_quad(&quad)?;
            }
        }

        tracing::info!(iri = %ontology, version = %version, "creating merged ontology");
        let version_iri = NamedNode::new(format!("{iri}{version}")).map_err(|e| {
            BundleError::Configuration(format!("invalid merged version IRI: {e}"))
        })?;
        self.add(ontology.clone(), rdf::TYPE, owl::ONTOLOGY.into_owned())?;
        self.add(ontology.clone(), owl::VERSION_IRI, version_iri)?;
        self.add(
            ontology.clone(),
            owl::VERSION_INFO,
            Literal::new_typed_literal("Created by merge tool.", xsd::STRING),
        )?;
        for import in external {
            tracing::debug!(import = %import, "transferring external dependency");
            self.add(ontology.clone(), owl::IMPORTS, import)?;
        }
        Ok(())
    }

    /// Remove semantic-version suffixes from every `owl:imports` target.
    pub fn strip_import_versions(&self) -> Result<()> {
        for quad in self.quads_matching(None, Some(owl::IMPORTS), None)? {
            let Term::NamedNode(import) = &quad.object else {
                continue;
            };
            let base = without_version(import.as_str());
            if base.len() == import.as_str().len() {
                continue;
            }
            let unversioned = NamedNode::new(base).map_err(|e| {
                BundleError::Configuration(format!("invalid import IRI '{base}': {e}"))
            })?;
            tracing::debug!(import = %import, "stripping import version");
            self.remove_quad(&quad)?;
            self.add(quad.subject.clone(), owl::IMPORTS, unversioned)?;
        }
        Ok(())
    }
}
