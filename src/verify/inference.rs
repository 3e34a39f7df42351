//! Rule-based inference applied before SHACL validation.
//!
//! The reasoner is a fixpoint loop over SPARQL INSERT rules: RDFS covers
//! subclass/subproperty propagation plus domain/range typing, the OWL-RL
//! set adds inverse/symmetric/transitive property reasoning and
//! equivalence. Each pass runs every rule once; the loop stops when the
//! triple count stabilizes.

use crate::bundle::InferenceMode;
use crate::error::{BundleError, Result};
use crate::graph::GraphModel;

const PROLOGUE: &str = "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
                        PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
                        PREFIX owl: <http://www.w3.org/2002/07/owl#>\n";

const RDFS_RULES: &[&str] = &[
    "INSERT { ?a rdfs:subClassOf ?c } WHERE { ?a rdfs:subClassOf ?b . ?b rdfs:subClassOf ?c }",
    "INSERT { ?x rdf:type ?c } WHERE { ?x rdf:type ?b . ?b rdfs:subClassOf ?c }",
    "INSERT { ?p rdfs:subPropertyOf ?r } WHERE { ?p rdfs:subPropertyOf ?q . ?q rdfs:subPropertyOf ?r }",
    "INSERT { ?s ?q ?o } WHERE { ?p rdfs:subPropertyOf ?q . ?s ?p ?o . FILTER(isIRI(?q)) }",
    "INSERT { ?s rdf:type ?c } WHERE { ?p rdfs:domain ?c . ?s ?p ?o }",
    "INSERT { ?o rdf:type ?c } WHERE { ?p rdfs:range ?c . ?s ?p ?o . FILTER(!isLiteral(?o)) }",
];

const OWL_RULES: &[&str] = &[
    "INSERT { ?o ?q ?s } WHERE { ?p owl:inverseOf ?q . ?s ?p ?o . FILTER(isIRI(?q) && !isLiteral(?o)) }",
    "INSERT { ?o ?p ?s } WHERE { ?q owl:inverseOf ?p . ?s ?q ?o . FILTER(isIRI(?p) && !isLiteral(?o)) }",
    "INSERT { ?o ?p ?s } WHERE { ?p rdf:type owl:SymmetricProperty . ?s ?p ?o . FILTER(!isLiteral(?o)) }",
    "INSERT { ?s ?p ?o } WHERE { ?p rdf:type owl:TransitiveProperty . ?s ?p ?m . ?m ?p ?o }",
    "INSERT { ?a rdfs:subClassOf ?b . ?b rdfs:subClassOf ?a } WHERE { ?a owl:equivalentClass ?b }",
    "INSERT { ?a rdfs:subPropertyOf ?b . ?b rdfs:subPropertyOf ?a } WHERE { ?a owl:equivalentProperty ?b }",
];

// Backstop against rule sets that keep generating fresh triples.
const MAX_PASSES: usize = 50;

/// Apply the closure for the requested mode to the data graph in place.
pub fn apply(mode: InferenceMode, data: &GraphModel) -> Result<()> {
    let rules: Vec<&str> = match mode {
        InferenceMode::None => return Ok(()),
        InferenceMode::Rdfs => RDFS_RULES.to_vec(),
        InferenceMode::Owlrl => OWL_RULES.to_vec(),
        InferenceMode::Both => RDFS_RULES.iter().chain(OWL_RULES).copied().collect(),
    };

    for pass in 0..MAX_PASSES {
        let before = data.len();
        for rule in &rules {
            let update = format!("{PROLOGUE}{rule}");
            data.update(&update)
                .map_err(|e| BundleError::query("inference rule", "local graph", e))?;
        }
        if data.len() == before {
            tracing::debug!(passes = pass + 1, triples = data.len(), "inference converged");
            return Ok(());
        }
    }
    tracing::warn!(
        passes = MAX_PASSES,
        "inference did not converge, continuing with partial closure"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(turtle: &str) -> GraphModel {
        let mut model = GraphModel::new().unwrap();
        model.load_turtle(turtle).unwrap();
        model
    }

    #[test]
    fn test_none_is_a_no_op() {
        let data = model("<urn:a> <urn:b> <urn:c> .");
        let before = data.len();
        apply(InferenceMode::None, &data).unwrap();
        assert_eq!(data.len(), before);
    }

    #[test]
    fn test_rdfs_subclass_typing() {
        let data = model(
            r#"@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
               @prefix ex: <http://example.com/> .
               ex:Dog rdfs:subClassOf ex:Animal .
               ex:Animal rdfs:subClassOf ex:LivingThing .
               ex:rex a ex:Dog ."#,
        );
        apply(InferenceMode::Rdfs, &data).unwrap();
        let ask = data
            .query("PREFIX ex: <http://example.com/> ASK { ex:rex a ex:LivingThing }")
            .unwrap();
        match ask {
            oxigraph::sparql::QueryResults::Boolean(answer) => assert!(answer),
            _ => panic!("expected boolean"),
        }
    }

    #[test]
    fn test_owlrl_symmetric_property() {
        let data = model(
            r#"@prefix owl: <http://www.w3.org/2002/07/owl#> .
               @prefix ex: <http://example.com/> .
               ex:adjacentTo a owl:SymmetricProperty .
               ex:a ex:adjacentTo ex:b ."#,
        );
        apply(InferenceMode::Owlrl, &data).unwrap();
        let ask = data
            .query("PREFIX ex: <http://example.com/> ASK { ex:b ex:adjacentTo ex:a }")
            .unwrap();
        match ask {
            oxigraph::sparql::QueryResults::Boolean(answer) => assert!(answer),
            _ => panic!("expected boolean"),
        }
    }
}
