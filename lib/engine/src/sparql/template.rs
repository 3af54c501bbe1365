//! Quad templates of `CONSTRUCT` and of updates, instantiated once per solution.

use crate::sparql::eval::get_value;
use crate::sparql::plan::Tuple;
use crate::sparql::rewriting::VariableScope;
use sparqlite_model::{GraphName, NamedOrBlankNode, Quad, Subject, Term};
use spargebra::term::{
    GraphNamePattern, GroundQuad, GroundQuadPattern, GroundSubject, GroundTerm, GroundTermPattern,
    NamedNodePattern, QuadPattern, TermPattern, TriplePattern,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TemplateValue {
    Constant(Term),
    Variable(usize),
    /// A labelled blank node, fresh for each instantiation.
    BlankNode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TemplateGraph {
    Default,
    Value(TemplateValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuadTemplate {
    pub subject: TemplateValue,
    pub predicate: TemplateValue,
    pub object: TemplateValue,
    pub graph_name: TemplateGraph,
}

impl QuadTemplate {
    pub fn from_triple_pattern(pattern: &TriplePattern, scope: &mut VariableScope) -> Self {
        Self {
            subject: term_pattern(&pattern.subject, scope),
            predicate: named_node_pattern(&pattern.predicate, scope),
            object: term_pattern(&pattern.object, scope),
            graph_name: TemplateGraph::Default,
        }
    }

    pub fn from_quad_pattern(pattern: &QuadPattern, scope: &mut VariableScope) -> Self {
        Self {
            subject: term_pattern(&pattern.subject, scope),
            predicate: named_node_pattern(&pattern.predicate, scope),
            object: term_pattern(&pattern.object, scope),
            graph_name: graph_name_pattern(&pattern.graph_name, scope),
        }
    }

    pub fn from_ground_quad_pattern(pattern: &GroundQuadPattern, scope: &mut VariableScope) -> Self {
        Self {
            subject: ground_term_pattern(&pattern.subject, scope),
            predicate: named_node_pattern(&pattern.predicate, scope),
            object: ground_term_pattern(&pattern.object, scope),
            graph_name: graph_name_pattern(&pattern.graph_name, scope),
        }
    }

    pub fn from_quad(quad: &spargebra::term::Quad) -> Self {
        Self {
            subject: match &quad.subject {
                Subject::BlankNode(node) => TemplateValue::BlankNode(node.as_str().to_owned()),
                subject => TemplateValue::Constant(subject.clone().into()),
            },
            predicate: TemplateValue::Constant(quad.predicate.clone().into()),
            object: match &quad.object {
                Term::BlankNode(node) => TemplateValue::BlankNode(node.as_str().to_owned()),
                object => TemplateValue::Constant(object.clone()),
            },
            graph_name: graph_name(&quad.graph_name),
        }
    }

    pub fn from_ground_quad(quad: &GroundQuad) -> Self {
        let GroundSubject::NamedNode(subject) = &quad.subject;
        Self {
            subject: TemplateValue::Constant(subject.clone().into()),
            predicate: TemplateValue::Constant(quad.predicate.clone().into()),
            object: TemplateValue::Constant(match &quad.object {
                GroundTerm::NamedNode(node) => node.clone().into(),
                GroundTerm::Literal(literal) => literal.clone().into(),
            }),
            graph_name: graph_name(&quad.graph_name),
        }
    }

    /// Builds the quad for one solution.
    ///
    /// Returns `None` if a variable is unbound or a position gets a term it cannot hold.
    pub fn instantiate(
        &self,
        tuple: &Tuple,
        blank_node: &mut dyn FnMut(&str) -> NamedOrBlankNode,
    ) -> Option<Quad> {
        let subject = match self.subject.instantiate(tuple, blank_node)? {
            Term::NamedNode(node) => Subject::from(node),
            Term::BlankNode(node) => Subject::from(node),
            Term::Literal(_) => return None,
        };
        let Term::NamedNode(predicate) = self.predicate.instantiate(tuple, blank_node)? else {
            return None;
        };
        let object = self.object.instantiate(tuple, blank_node)?;
        let graph_name = match &self.graph_name {
            TemplateGraph::Default => GraphName::DefaultGraph,
            TemplateGraph::Value(value) => match value.instantiate(tuple, blank_node)? {
                Term::NamedNode(node) => node.into(),
                Term::BlankNode(node) => node.into(),
                Term::Literal(_) => return None,
            },
        };
        Some(Quad::new(subject, predicate, object, graph_name))
    }
}

impl TemplateValue {
    fn instantiate(
        &self,
        tuple: &Tuple,
        blank_node: &mut dyn FnMut(&str) -> NamedOrBlankNode,
    ) -> Option<Term> {
        match self {
            Self::Constant(term) => Some(term.clone()),
            Self::Variable(slot) => get_value(*slot, tuple).cloned(),
            Self::BlankNode(label) => Some(blank_node(label).into()),
        }
    }
}

fn term_pattern(pattern: &TermPattern, scope: &mut VariableScope) -> TemplateValue {
    match pattern {
        TermPattern::NamedNode(node) => TemplateValue::Constant(node.clone().into()),
        TermPattern::BlankNode(node) => TemplateValue::BlankNode(node.as_str().to_owned()),
        TermPattern::Literal(literal) => TemplateValue::Constant(literal.clone().into()),
        TermPattern::Variable(variable) => TemplateValue::Variable(scope.slot(variable)),
    }
}

fn ground_term_pattern(pattern: &GroundTermPattern, scope: &mut VariableScope) -> TemplateValue {
    match pattern {
        GroundTermPattern::NamedNode(node) => TemplateValue::Constant(node.clone().into()),
        GroundTermPattern::Literal(literal) => TemplateValue::Constant(literal.clone().into()),
        GroundTermPattern::Variable(variable) => TemplateValue::Variable(scope.slot(variable)),
    }
}

fn named_node_pattern(pattern: &NamedNodePattern, scope: &mut VariableScope) -> TemplateValue {
    match pattern {
        NamedNodePattern::NamedNode(node) => TemplateValue::Constant(node.clone().into()),
        NamedNodePattern::Variable(variable) => TemplateValue::Variable(scope.slot(variable)),
    }
}

fn graph_name_pattern(pattern: &GraphNamePattern, scope: &mut VariableScope) -> TemplateGraph {
    match pattern {
        GraphNamePattern::NamedNode(node) => {
            TemplateGraph::Value(TemplateValue::Constant(node.clone().into()))
        }
        GraphNamePattern::DefaultGraph => TemplateGraph::Default,
        GraphNamePattern::Variable(variable) => {
            TemplateGraph::Value(TemplateValue::Variable(scope.slot(variable)))
        }
    }
}

fn graph_name(graph_name: &spargebra::term::GraphName) -> TemplateGraph {
    match graph_name {
        spargebra::term::GraphName::NamedNode(node) => {
            TemplateGraph::Value(TemplateValue::Constant(node.clone().into()))
        }
        spargebra::term::GraphName::DefaultGraph => TemplateGraph::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_model::{BlankNode, Literal, NamedNode};

    #[test]
    fn unbound_and_misplaced_values_skip_the_quad() {
        let template = QuadTemplate {
            subject: TemplateValue::Variable(0),
            predicate: TemplateValue::Constant(NamedNode::new_unchecked("urn:p").into()),
            object: TemplateValue::BlankNode("b".to_owned()),
            graph_name: TemplateGraph::Default,
        };
        let mut blank_node = |_: &str| NamedOrBlankNode::from(BlankNode::new_unchecked("x"));

        assert_eq!(template.instantiate(&vec![None], &mut blank_node), None);
        assert_eq!(
            template.instantiate(
                &vec![Some(Literal::new_simple_literal("s").into())],
                &mut blank_node
            ),
            None
        );
        let quad = template
            .instantiate(
                &vec![Some(NamedNode::new_unchecked("urn:s").into())],
                &mut blank_node,
            )
            .unwrap();
        assert_eq!(quad.object, BlankNode::new_unchecked("x").into());
    }
}
