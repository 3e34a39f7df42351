//! SHACL shape validation.
//!
//! A deliberately focused validator: node shapes selected by
//! `sh:targetClass`/`sh:targetNode`, property shapes with the common core
//! constraints (cardinality, datatype, class, node kind, pattern, in,
//! hasValue, string length). The outcome is a standard `sh:` report graph
//! so the same table rendering and `failOn` filtering applies to SHACL and
//! CONSTRUCT verdicts alike.

use oxigraph::model::vocab::rdf;
use oxigraph::model::{BlankNode, Literal, NamedNode, Subject, Term};
use regex::Regex;

use super::Severity;
use crate::error::{BundleError, Result};
use crate::graph::GraphModel;
use crate::graph::vocab::sh;

/// `sh:nodeKind` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Iri,
    Literal,
    BlankNode,
}

impl NodeKind {
    fn from_term(term: &Term) -> Option<Self> {
        match term {
            Term::NamedNode(node) if node.as_ref() == sh::IRI_KIND => Some(NodeKind::Iri),
            Term::NamedNode(node) if node.as_ref() == sh::LITERAL_KIND => Some(NodeKind::Literal),
            Term::NamedNode(node) if node.as_ref() == sh::BLANK_NODE_KIND => {
                Some(NodeKind::BlankNode)
            }
            _ => None,
        }
    }

    fn matches(&self, term: &Term) -> bool {
        matches!(
            (self, term),
            (NodeKind::Iri, Term::NamedNode(_))
                | (NodeKind::Literal, Term::Literal(_))
                | (NodeKind::BlankNode, Term::BlankNode(_))
        )
    }

    fn describe(&self) -> &'static str {
        match self {
            NodeKind::Iri => "an IRI",
            NodeKind::Literal => "a literal",
            NodeKind::BlankNode => "a blank node",
        }
    }
}

#[derive(Debug)]
struct PropertyShape {
    source: Term,
    path: NamedNode,
    min_count: Option<u64>,
    max_count: Option<u64>,
    datatype: Option<NamedNode>,
    class: Option<NamedNode>,
    node_kind: Option<NodeKind>,
    pattern: Option<Regex>,
    in_values: Option<Vec<Term>>,
    has_value: Option<Term>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    severity: Option<Severity>,
    message: Option<String>,
}

#[derive(Debug)]
struct NodeShape {
    target_classes: Vec<NamedNode>,
    target_nodes: Vec<Term>,
    severity: Severity,
    properties: Vec<PropertyShape>,
}

/// One constraint failure, before report-graph encoding.
struct Finding {
    focus: Term,
    path: NamedNode,
    value: Option<Term>,
    component: &'static str,
    message: String,
    severity: Severity,
    source: Term,
}

pub struct ShaclValidator {
    shapes: Vec<NodeShape>,
}

impl ShaclValidator {
    /// Compile every node shape declared in the shapes graph.
    pub fn compile(shapes: &GraphModel) -> Result<Self> {
        let mut shape_subjects = Vec::new();
        for quad in shapes.quads_matching(None, Some(rdf::TYPE), Some(sh::NODE_SHAPE.into()))? {
            push_unique(&mut shape_subjects, quad.subject);
        }
        // Shapes may be implicit: anything carrying sh:targetClass.
        for quad in shapes.quads_matching(None, Some(sh::TARGET_CLASS), None)? {
            push_unique(&mut shape_subjects, quad.subject);
        }

        let mut compiled = Vec::with_capacity(shape_subjects.len());
        for subject in shape_subjects {
            compiled.push(Self::compile_node_shape(shapes, &subject)?);
        }
        Ok(Self { shapes: compiled })
    }

    fn compile_node_shape(shapes: &GraphModel, subject: &Subject) -> Result<NodeShape> {
        let mut target_classes = Vec::new();
        for quad in shapes.quads_matching(Some(subject.as_ref()), Some(sh::TARGET_CLASS), None)? {
            if let Term::NamedNode(class) = quad.object {
                target_classes.push(class);
            }
        }
        let target_nodes = shapes
            .quads_matching(Some(subject.as_ref()), Some(sh::TARGET_NODE), None)?
            .into_iter()
            .map(|quad| quad.object)
            .collect();

        let severity = object_of(shapes, subject, sh::SEVERITY)?
            .map(|term| severity_of(&term))
            .unwrap_or(Severity::Violation);

        let mut properties = Vec::new();
        for quad in shapes.quads_matching(Some(subject.as_ref()), Some(sh::PROPERTY), None)? {
            let Some(property_subject) = term_as_subject(&quad.object) else {
                continue;
            };
            if let Some(property) =
                Self::compile_property_shape(shapes, &property_subject, &quad.object)?
            {
                properties.push(property);
            }
        }

        Ok(NodeShape {
            target_classes,
            target_nodes,
            severity,
            properties,
        })
    }

    fn compile_property_shape(
        shapes: &GraphModel,
        subject: &Subject,
        source: &Term,
    ) -> Result<Option<PropertyShape>> {
        let Some(Term::NamedNode(path)) = object_of(shapes, subject, sh::PATH)? else {
            tracing::warn!(shape = %source, "property shape without a direct IRI path, skipping");
            return Ok(None);
        };

        let pattern = match object_of(shapes, subject, sh::PATTERN)? {
            Some(Term::Literal(literal)) => Some(Regex::new(literal.value()).map_err(|e| {
                BundleError::Configuration(format!(
                    "invalid sh:pattern '{}': {e}",
                    literal.value()
                ))
            })?),
            _ => None,
        };

        let in_values = match object_of(shapes, subject, sh::IN)? {
            Some(head) => Some(read_list(shapes, &head)?),
            None => None,
        };

        Ok(Some(PropertyShape {
            source: source.clone(),
            path,
            min_count: count_of(shapes, subject, sh::MIN_COUNT)?,
            max_count: count_of(shapes, subject, sh::MAX_COUNT)?,
            datatype: named_of(shapes, subject, sh::DATATYPE)?,
            class: named_of(shapes, subject, sh::CLASS)?,
            node_kind: object_of(shapes, subject, sh::NODE_KIND)?
                .as_ref()
                .and_then(NodeKind::from_term),
            pattern,
            in_values,
            has_value: object_of(shapes, subject, sh::HAS_VALUE)?,
            min_length: count_of(shapes, subject, sh::MIN_LENGTH)?,
            max_length: count_of(shapes, subject, sh::MAX_LENGTH)?,
            severity: object_of(shapes, subject, sh::SEVERITY)?.map(|term| severity_of(&term)),
            message: match object_of(shapes, subject, sh::MESSAGE)? {
                Some(Term::Literal(literal)) => Some(literal.value().to_string()),
                _ => None,
            },
        }))
    }

    /// Validate the data graph, producing a `sh:ValidationReport` graph.
    /// An empty report (zero results) means the data conforms.
    pub fn validate(&self, data: &GraphModel) -> Result<GraphModel> {
        let mut findings = Vec::new();
        for shape in &self.shapes {
            let mut focus_nodes: Vec<Term> = Vec::new();
            for class in &shape.target_classes {
                for quad in
                    data.quads_matching(None, Some(rdf::TYPE), Some(class.as_ref().into()))?
                {
                    let focus = subject_as_term(&quad.subject);
                    if !focus_nodes.contains(&focus) {
                        focus_nodes.push(focus);
                    }
                }
            }
            for node in &shape.target_nodes {
                if !focus_nodes.contains(node) {
                    focus_nodes.push(node.clone());
                }
            }

            for focus in &focus_nodes {
                let Some(focus_subject) = term_as_subject(focus) else {
                    continue;
                };
                for property in &shape.properties {
                    let values: Vec<Term> = data
                        .quads_matching(
                            Some(focus_subject.as_ref()),
                            Some(property.path.as_ref()),
                            None,
                        )?
                        .into_iter()
                        .map(|quad| quad.object)
                        .collect();
                    check_property(data, shape, property, focus, &values, &mut findings)?;
                }
            }
        }
        build_report(&findings)
    }
}

fn check_property(
    data: &GraphModel,
    shape: &NodeShape,
    property: &PropertyShape,
    focus: &Term,
    values: &[Term],
    findings: &mut Vec<Finding>,
) -> Result<()> {
    let severity = property.severity.unwrap_or(shape.severity);
    let mut record = |value: Option<&Term>, component: &'static str, default_message: String| {
        findings.push(Finding {
            focus: focus.clone(),
            path: property.path.clone(),
            value: value.cloned(),
            component,
            message: property
                .message
                .clone()
                .unwrap_or(default_message),
            severity,
            source: property.source.clone(),
        });
    };

    if let Some(min) = property.min_count {
        if (values.len() as u64) < min {
            record(
                None,
                "MinCountConstraintComponent",
                format!("fewer than {min} values for {}", property.path),
            );
        }
    }
    if let Some(max) = property.max_count {
        if (values.len() as u64) > max {
            record(
                None,
                "MaxCountConstraintComponent",
                format!("more than {max} values for {}", property.path),
            );
        }
    }

    for value in values {
        if let Some(datatype) = &property.datatype {
            let conforms = matches!(value, Term::Literal(literal) if literal.datatype() == datatype.as_ref());
            if !conforms {
                record(
                    Some(value),
                    "DatatypeConstraintComponent",
                    format!("value is not a {datatype} literal"),
                );
            }
        }
        if let Some(class) = &property.class {
            let typed = match term_as_subject(value) {
                Some(subject) => !data
                    .quads_matching(
                        Some(subject.as_ref()),
                        Some(rdf::TYPE),
                        Some(class.as_ref().into()),
                    )?
                    .is_empty(),
                None => false,
            };
            if !typed {
                record(
                    Some(value),
                    "ClassConstraintComponent",
                    format!("value is not an instance of {class}"),
                );
            }
        }
        if let Some(kind) = property.node_kind {
            if !kind.matches(value) {
                record(
                    Some(value),
                    "NodeKindConstraintComponent",
                    format!("value is not {}", kind.describe()),
                );
            }
        }
        if let Some(pattern) = &property.pattern {
            let text = lexical_form(value);
            let conforms = match text {
                Some(text) => pattern.is_match(&text),
                None => false,
            };
            if !conforms {
                record(
                    Some(value),
                    "PatternConstraintComponent",
                    format!("value does not match pattern {}", pattern.as_str()),
                );
            }
        }
        if let Some(allowed) = &property.in_values {
            if !allowed.contains(value) {
                record(
                    Some(value),
                    "InConstraintComponent",
                    "value is not in the allowed list".to_string(),
                );
            }
        }
        if let Some(min) = property.min_length {
            let length = lexical_form(value).map(|t| t.chars().count() as u64);
            if length.is_none() || length.is_some_and(|l| l < min) {
                record(
                    Some(value),
                    "MinLengthConstraintComponent",
                    format!("value is shorter than {min} characters"),
                );
            }
        }
        if let Some(max) = property.max_length {
            let length = lexical_form(value).map(|t| t.chars().count() as u64);
            if length.is_none() || length.is_some_and(|l| l > max) {
                record(
                    Some(value),
                    "MaxLengthConstraintComponent",
                    format!("value is longer than {max} characters"),
                );
            }
        }
    }

    if let Some(required) = &property.has_value {
        if !values.contains(required) {
            record(
                None,
                "HasValueConstraintComponent",
                format!("required value {required} is missing"),
            );
        }
    }
    Ok(())
}

fn build_report(findings: &[Finding]) -> Result<GraphModel> {
    let report = GraphModel::new()?;
    if findings.is_empty() {
        return Ok(report);
    }

    let root = BlankNode::default();
    report.add(root.clone(), rdf::TYPE, sh::VALIDATION_REPORT.into_owned())?;
    report.add(root.clone(), sh::CONFORMS, Literal::from(false))?;

    for finding in findings {
        let result = BlankNode::default();
        report.add(root.clone(), sh::RESULT, result.clone())?;
        report.add(
            result.clone(),
            rdf::TYPE,
            sh::VALIDATION_RESULT.into_owned(),
        )?;
        report.add(result.clone(), sh::FOCUS_NODE, finding.focus.clone())?;
        report.add(result.clone(), sh::RESULT_PATH, finding.path.clone())?;
        if let Some(value) = &finding.value {
            report.add(result.clone(), sh::VALUE, value.clone())?;
        }
        report.add(
            result.clone(),
            sh::RESULT_MESSAGE,
            Literal::new_simple_literal(&finding.message),
        )?;
        report.add(
            result.clone(),
            sh::RESULT_SEVERITY,
            finding.severity.to_iri(),
        )?;
        report.add(
            result.clone(),
            sh::SOURCE_CONSTRAINT_COMPONENT,
            NamedNode::new_unchecked(format!("{}{}", sh::NS, finding.component)),
        )?;
        report.add(result, sh::SOURCE_SHAPE, finding.source.clone())?;
    }
    Ok(report)
}

fn push_unique(subjects: &mut Vec<Subject>, subject: Subject) {
    if !subjects.contains(&subject) {
        subjects.push(subject);
    }
}

fn term_as_subject(term: &Term) -> Option<Subject> {
    match term {
        Term::NamedNode(node) => Some(node.clone().into()),
        Term::BlankNode(node) => Some(node.clone().into()),
        _ => None,
    }
}

fn subject_as_term(subject: &Subject) -> Term {
    match subject {
        Subject::NamedNode(node) => Term::NamedNode(node.clone()),
        Subject::BlankNode(node) => Term::BlankNode(node.clone()),
        other => Term::NamedNode(NamedNode::new_unchecked(other.to_string())),
    }
}

fn lexical_form(term: &Term) -> Option<String> {
    match term {
        Term::Literal(literal) => Some(literal.value().to_string()),
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        _ => None,
    }
}

fn object_of(
    model: &GraphModel,
    subject: &Subject,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> Result<Option<Term>> {
    Ok(model
        .quads_matching(Some(subject.as_ref()), Some(predicate), None)?
        .into_iter()
        .next()
        .map(|quad| quad.object))
}

fn named_of(
    model: &GraphModel,
    subject: &Subject,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> Result<Option<NamedNode>> {
    Ok(match object_of(model, subject, predicate)? {
        Some(Term::NamedNode(node)) => Some(node),
        _ => None,
    })
}

fn count_of(
    model: &GraphModel,
    subject: &Subject,
    predicate: oxigraph::model::NamedNodeRef<'_>,
) -> Result<Option<u64>> {
    match object_of(model, subject, predicate)? {
        Some(Term::Literal(literal)) => literal.value().parse().map(Some).map_err(|_| {
            BundleError::Configuration(format!(
                "non-numeric cardinality '{}' on {predicate}",
                literal.value()
            ))
        }),
        _ => Ok(None),
    }
}

fn severity_of(term: &Term) -> Severity {
    match term {
        Term::NamedNode(node) => super::report::severity_from_iri(node.as_str()),
        _ => Severity::Violation,
    }
}

/// Walk an rdf:List into its member terms.
fn read_list(model: &GraphModel, head: &Term) -> Result<Vec<Term>> {
    let mut members = Vec::new();
    let mut current = head.clone();
    loop {
        if let Term::NamedNode(node) = &current {
            if node.as_ref() == rdf::NIL {
                break;
            }
        }
        let Some(subject) = term_as_subject(&current) else {
            break;
        };
        match object_of(model, &subject, rdf::FIRST)? {
            Some(member) => members.push(member),
            None => break,
        }
        match object_of(model, &subject, rdf::REST)? {
            Some(rest) => current = rest,
            None => break,
        }
    }
    Ok(members)
}
