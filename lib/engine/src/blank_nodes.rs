use sparqlite_model::vocab::BLANK_NODE_IRI_PREFIX;
use sparqlite_model::{BlankNode, GraphName, NamedNode, NamedOrBlankNode, Quad, Subject, Term};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The identifiers generated for the blank node labels of one insertion.
pub type BlankNodeLabels = BTreeMap<String, NamedOrBlankNode>;

/// Generates the identifiers of inserted blank nodes.
///
/// Unless the store keeps anonymous blank nodes, every inserted blank node is skolemized into a
/// `urn:bnode:<uuid>` IRI so that later statements can address it. Within one allocation scope
/// the same label always resolves to the same identifier.
#[derive(Debug, Clone, Default)]
pub struct BlankNodeAllocator {
    anonymous: bool,
    labels: BlankNodeLabels,
}

impl BlankNodeAllocator {
    pub fn new(anonymous: bool) -> Self {
        Self {
            anonymous,
            labels: BlankNodeLabels::new(),
        }
    }

    /// A new identifier that is not tied to any label.
    pub fn fresh(&self) -> NamedOrBlankNode {
        if self.anonymous {
            BlankNode::default().into()
        } else {
            NamedNode::new_unchecked(format!("{BLANK_NODE_IRI_PREFIX}{}", Uuid::new_v4())).into()
        }
    }

    /// The identifier of `label`, allocated on first use.
    pub fn resolve(&mut self, label: &str) -> NamedOrBlankNode {
        if let Some(node) = self.labels.get(label) {
            return node.clone();
        }
        let node = self.fresh();
        self.labels.insert(label.to_owned(), node.clone());
        node
    }

    pub fn labels(&self) -> &BlankNodeLabels {
        &self.labels
    }

    /// Returns the allocated labels and starts a new allocation scope.
    pub fn take_labels(&mut self) -> BlankNodeLabels {
        std::mem::take(&mut self.labels)
    }

    /// Replaces the blank nodes of a parsed quad by their allocated identifiers.
    pub fn relabel_quad(&mut self, quad: Quad) -> Quad {
        let subject = match quad.subject {
            Subject::BlankNode(node) => self.resolve(node.as_str()).into(),
            subject => subject,
        };
        let object = match quad.object {
            Term::BlankNode(node) => self.resolve(node.as_str()).into(),
            object => object,
        };
        let graph_name = match quad.graph_name {
            GraphName::BlankNode(node) => self.resolve(node.as_str()).into(),
            graph_name => graph_name,
        };
        Quad::new(subject, quad.predicate, object, graph_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable_within_a_scope() {
        let mut allocator = BlankNodeAllocator::new(false);
        let a = allocator.resolve("a");
        assert_eq!(allocator.resolve("a"), a);
        assert_ne!(allocator.resolve("b"), a);
        let NamedOrBlankNode::NamedNode(node) = &a else {
            panic!("expected a skolem IRI, got {a}");
        };
        assert!(node.as_str().starts_with(BLANK_NODE_IRI_PREFIX));

        let labels = allocator.take_labels();
        assert_eq!(labels.len(), 2);
        assert_ne!(allocator.resolve("a"), a);
    }

    #[test]
    fn anonymous_allocation_keeps_blank_nodes() {
        let mut allocator = BlankNodeAllocator::new(true);
        assert!(matches!(
            allocator.resolve("x"),
            NamedOrBlankNode::BlankNode(_)
        ));
    }
}
