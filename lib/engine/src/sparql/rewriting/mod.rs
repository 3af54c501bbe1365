mod expression_rewriter;
mod graph_pattern_rewriter;

pub use graph_pattern_rewriter::GraphPatternRewriter;

use sparqlite_model::{BlankNode, Variable};

/// Prefix of the hidden variables that blank nodes of query patterns are turned into.
pub const BLANK_NODE_VARIABLE_PREFIX: &str = "__bnode_";

/// Assigns tuple slots to variables.
///
/// A new scope is opened for every sub-select. The parameters are registered first, so they have
/// the same slots in every scope.
#[derive(Debug, Clone)]
pub struct VariableScope {
    variables: Vec<Variable>,
}

impl VariableScope {
    pub fn new(parameters: &[Variable]) -> Self {
        Self {
            variables: parameters.to_vec(),
        }
    }

    pub fn slot(&mut self, variable: &Variable) -> usize {
        if let Some(slot) = self.variables.iter().position(|v| v == variable) {
            slot
        } else {
            self.variables.push(variable.clone());
            self.variables.len() - 1
        }
    }

    pub fn blank_node_slot(&mut self, node: &BlankNode) -> usize {
        self.slot(&Variable::new_unchecked(format!(
            "{BLANK_NODE_VARIABLE_PREFIX}{}",
            node.as_str()
        )))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_keep_the_first_slots() {
        let parameters = [Variable::new_unchecked("__param_a")];
        let mut scope = VariableScope::new(&parameters);
        assert_eq!(scope.slot(&Variable::new_unchecked("x")), 1);
        assert_eq!(scope.slot(&Variable::new_unchecked("__param_a")), 0);
        assert_eq!(scope.slot(&Variable::new_unchecked("x")), 1);
        assert_eq!(scope.blank_node_slot(&BlankNode::new_unchecked("b")), 2);
        assert_eq!(scope.len(), 3);
    }
}
