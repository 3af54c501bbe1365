use crate::sparql::error::QueryEvaluationError;
use crate::sparql::plan::{
    Comparator, PatternValue, PlanAggregation, PlanAggregationFunction, PlanGraph, PlanNode, Tuple,
};
use crate::sparql::rewriting::expression_rewriter::ExpressionRewriter;
use crate::sparql::rewriting::VariableScope;
use sparqlite_model::{Term, Variable};
use spargebra::algebra::{AggregateExpression, AggregateFunction, GraphPattern, OrderExpression};
use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
use std::cell::RefCell;
use std::sync::Arc;

/// Turns spargebra graph patterns into [`PlanNode`]s.
pub struct GraphPatternRewriter {
    parameters: Vec<Variable>,
    state: RefCell<RewritingState>,
}

impl GraphPatternRewriter {
    pub fn new(parameters: Vec<Variable>) -> Self {
        Self {
            parameters,
            state: RefCell::default(),
        }
    }

    /// Opens a fresh slot space with the parameters in its first slots.
    pub fn new_scope(&self) -> VariableScope {
        VariableScope::new(&self.parameters)
    }

    /// Rewrites a root pattern in `scope`.
    pub fn rewrite(
        &self,
        pattern: &GraphPattern,
        scope: &mut VariableScope,
    ) -> Result<PlanNode, QueryEvaluationError> {
        self.rewrite_graph_pattern(pattern, scope)
    }

    pub(super) fn rewrite_graph_pattern(
        &self,
        pattern: &GraphPattern,
        scope: &mut VariableScope,
    ) -> Result<PlanNode, QueryEvaluationError> {
        match pattern {
            GraphPattern::Bgp { patterns } => Ok(self.rewrite_bgp(patterns, scope)),
            GraphPattern::Path { .. } => Err(QueryEvaluationError::NotImplemented(
                "property paths".to_owned(),
            )),
            GraphPattern::Join { left, right } => Ok(PlanNode::Join {
                left: Arc::new(self.rewrite_graph_pattern(left, scope)?),
                right: Arc::new(self.rewrite_graph_pattern(right, scope)?),
            }),
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => {
                let left = self.rewrite_graph_pattern(left, scope)?;
                let right = self.rewrite_graph_pattern(right, scope)?;
                let expression = expression
                    .as_ref()
                    .map(|e| ExpressionRewriter::new(self).rewrite(e, scope))
                    .transpose()?
                    .map(Arc::new);
                Ok(PlanNode::LeftJoin {
                    left: Arc::new(left),
                    right: Arc::new(right),
                    expression,
                })
            }
            GraphPattern::Filter { expr, inner } => {
                let child = self.rewrite_graph_pattern(inner, scope)?;
                let expression = ExpressionRewriter::new(self).rewrite(expr, scope)?;
                Ok(PlanNode::Filter {
                    child: Arc::new(child),
                    expression: Arc::new(expression),
                })
            }
            GraphPattern::Union { left, right } => {
                let mut children = Vec::new();
                for side in [left, right] {
                    match self.rewrite_graph_pattern(side, scope)? {
                        PlanNode::Union { children: nested } => children.extend(nested),
                        other => children.push(Arc::new(other)),
                    }
                }
                Ok(PlanNode::Union { children })
            }
            GraphPattern::Graph { name, inner } => {
                let previous = self.state.replace(RewritingState {
                    active_graph: Some(name.clone()),
                });
                let result = self.rewrite_graph_pattern(inner, scope);
                self.state.replace(previous);
                result
            }
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                let child = self.rewrite_graph_pattern(inner, scope)?;
                let expression = ExpressionRewriter::new(self).rewrite(expression, scope)?;
                Ok(PlanNode::Extend {
                    child: Arc::new(child),
                    position: scope.slot(variable),
                    expression: Arc::new(expression),
                })
            }
            GraphPattern::Minus { left, right } => Ok(PlanNode::Minus {
                left: Arc::new(self.rewrite_graph_pattern(left, scope)?),
                right: Arc::new(self.rewrite_graph_pattern(right, scope)?),
            }),
            GraphPattern::Values {
                variables,
                bindings,
            } => {
                let slots = variables.iter().map(|v| scope.slot(v)).collect::<Vec<_>>();
                let tuples = bindings
                    .iter()
                    .map(|row| {
                        let mut tuple = Tuple::new();
                        for (slot, value) in slots.iter().zip(row) {
                            if let Some(value) = value {
                                put_slot(&mut tuple, *slot, ground_term(value));
                            }
                        }
                        tuple
                    })
                    .collect();
                Ok(PlanNode::StaticBindings { tuples })
            }
            GraphPattern::OrderBy { inner, expression } => {
                let child = self.rewrite_graph_pattern(inner, scope)?;
                let expression_rewriter = ExpressionRewriter::new(self);
                let by = expression
                    .iter()
                    .map(|e| match e {
                        OrderExpression::Asc(e) => {
                            Ok(Comparator::Asc(expression_rewriter.rewrite(e, scope)?))
                        }
                        OrderExpression::Desc(e) => {
                            Ok(Comparator::Desc(expression_rewriter.rewrite(e, scope)?))
                        }
                    })
                    .collect::<Result<Vec<_>, QueryEvaluationError>>()?;
                Ok(PlanNode::Sort {
                    child: Arc::new(child),
                    by: by.into(),
                })
            }
            GraphPattern::Project { inner, variables } => {
                let mut inner_scope = self.new_scope();
                let child = self.rewrite_graph_pattern(inner, &mut inner_scope)?;
                let mapping = self
                    .parameters
                    .iter()
                    .chain(variables)
                    .map(|v| (inner_scope.slot(v), scope.slot(v)))
                    .collect::<Vec<_>>();
                Ok(PlanNode::Project {
                    child: Arc::new(child),
                    mapping: mapping.into(),
                })
            }
            GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } => {
                Ok(PlanNode::HashDeduplicate {
                    child: Arc::new(self.rewrite_graph_pattern(inner, scope)?),
                })
            }
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                let mut plan = self.rewrite_graph_pattern(inner, scope)?;
                if *start > 0 {
                    plan = PlanNode::Skip {
                        child: Arc::new(plan),
                        count: *start,
                    };
                }
                if let Some(length) = length {
                    plan = PlanNode::Limit {
                        child: Arc::new(plan),
                        count: *length,
                    };
                }
                Ok(plan)
            }
            GraphPattern::Group {
                inner,
                variables,
                aggregates,
            } => {
                let child = self.rewrite_graph_pattern(inner, scope)?;
                let key_mapping = variables.iter().map(|v| scope.slot(v)).collect::<Vec<_>>();
                let aggregates = aggregates
                    .iter()
                    .map(|(variable, aggregate)| {
                        Ok((
                            self.rewrite_aggregate(aggregate, scope)?,
                            scope.slot(variable),
                        ))
                    })
                    .collect::<Result<Vec<_>, QueryEvaluationError>>()?;
                Ok(PlanNode::Aggregate {
                    child: Arc::new(child),
                    key_mapping: key_mapping.into(),
                    aggregates: aggregates.into(),
                })
            }
            GraphPattern::Service { name, .. } => Err(QueryEvaluationError::NotImplemented(
                format!("SERVICE {name}"),
            )),
        }
    }

    fn rewrite_bgp(&self, patterns: &[TriplePattern], scope: &mut VariableScope) -> PlanNode {
        let graph_name = self.active_graph(scope);
        patterns
            .iter()
            .map(|pattern| PlanNode::QuadPattern {
                subject: pattern_value(&pattern.subject, scope),
                predicate: named_node_pattern_value(&pattern.predicate, scope),
                object: pattern_value(&pattern.object, scope),
                graph_name: graph_name.clone(),
            })
            .reduce(|left, right| PlanNode::Join {
                left: Arc::new(left),
                right: Arc::new(right),
            })
            .unwrap_or_else(|| PlanNode::StaticBindings {
                tuples: vec![Tuple::new()],
            })
    }

    fn active_graph(&self, scope: &mut VariableScope) -> PlanGraph {
        match &self.state.borrow().active_graph {
            None => PlanGraph::Default,
            Some(name) => PlanGraph::Named(named_node_pattern_value(name, scope)),
        }
    }

    fn rewrite_aggregate(
        &self,
        expression: &AggregateExpression,
        scope: &mut VariableScope,
    ) -> Result<PlanAggregation, QueryEvaluationError> {
        match expression {
            AggregateExpression::CountSolutions { distinct } => Ok(PlanAggregation {
                function: PlanAggregationFunction::Count,
                parameter: None,
                distinct: *distinct,
            }),
            AggregateExpression::FunctionCall {
                name,
                expr,
                distinct,
            } => {
                let function = match name {
                    AggregateFunction::Count => PlanAggregationFunction::Count,
                    AggregateFunction::Sum => PlanAggregationFunction::Sum,
                    AggregateFunction::Avg => PlanAggregationFunction::Avg,
                    AggregateFunction::Min => PlanAggregationFunction::Min,
                    AggregateFunction::Max => PlanAggregationFunction::Max,
                    AggregateFunction::Sample => PlanAggregationFunction::Sample,
                    AggregateFunction::GroupConcat { separator } => {
                        PlanAggregationFunction::GroupConcat {
                            separator: separator.as_deref().unwrap_or(" ").into(),
                        }
                    }
                    AggregateFunction::Custom(name) => {
                        return Err(QueryEvaluationError::NotImplemented(format!(
                            "custom aggregate function {name}"
                        )))
                    }
                };
                Ok(PlanAggregation {
                    function,
                    parameter: Some(ExpressionRewriter::new(self).rewrite(expr, scope)?),
                    distinct: *distinct,
                })
            }
        }
    }
}

#[derive(Clone, Default)]
struct RewritingState {
    /// The graph of the innermost enclosing `GRAPH` clause.
    active_graph: Option<NamedNodePattern>,
}

pub(super) fn pattern_value(term: &TermPattern, scope: &mut VariableScope) -> PatternValue {
    match term {
        TermPattern::NamedNode(node) => PatternValue::Constant(node.clone().into()),
        TermPattern::BlankNode(node) => PatternValue::Variable(scope.blank_node_slot(node)),
        TermPattern::Literal(literal) => PatternValue::Constant(literal.clone().into()),
        TermPattern::Variable(variable) => PatternValue::Variable(scope.slot(variable)),
    }
}

pub(super) fn named_node_pattern_value(
    pattern: &NamedNodePattern,
    scope: &mut VariableScope,
) -> PatternValue {
    match pattern {
        NamedNodePattern::NamedNode(node) => PatternValue::Constant(node.clone().into()),
        NamedNodePattern::Variable(variable) => PatternValue::Variable(scope.slot(variable)),
    }
}

fn ground_term(term: &GroundTerm) -> Term {
    match term {
        GroundTerm::NamedNode(node) => node.clone().into(),
        GroundTerm::Literal(literal) => literal.clone().into(),
    }
}

fn put_slot(tuple: &mut Tuple, slot: usize, value: Term) {
    if tuple.len() <= slot {
        tuple.resize(slot + 1, None);
    }
    tuple[slot] = Some(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::Query;

    fn rewrite_where(query: &str) -> Result<(PlanNode, VariableScope), QueryEvaluationError> {
        let Query::Select { pattern, .. } = Query::parse(query, None)? else {
            return Err(QueryEvaluationError::InternalError(
                "not a select".to_owned(),
            ));
        };
        let rewriter = GraphPatternRewriter::new(vec![Variable::new_unchecked("__param_p")]);
        let mut scope = rewriter.new_scope();
        let plan = rewriter.rewrite(&pattern, &mut scope)?;
        Ok((plan, scope))
    }

    #[test]
    fn sub_selects_get_their_own_scope() {
        let (plan, scope) =
            rewrite_where("SELECT ?s WHERE { { SELECT ?s WHERE { ?s ?p ?o } } }").unwrap();
        // Parameter and ?s only. ?p and ?o live in the inner scope.
        assert_eq!(scope.len(), 2);
        let PlanNode::Project { child, .. } = plan else {
            panic!("expected a projection, got {plan:?}");
        };
        let PlanNode::Project { mapping, .. } = child.as_ref() else {
            panic!("expected a nested projection, got {child:?}");
        };
        assert_eq!(mapping.as_ref(), [(0, 0), (1, 1)]);
    }

    #[test]
    fn graph_clause_binds_the_quad_graph() {
        let (plan, _) = rewrite_where("SELECT * WHERE { GRAPH ?g { ?s ?p ?o } }").unwrap();
        let PlanNode::Project { child, .. } = plan else {
            panic!("expected a projection, got {plan:?}");
        };
        assert!(matches!(
            child.as_ref(),
            PlanNode::QuadPattern {
                graph_name: PlanGraph::Named(PatternValue::Variable(_)),
                ..
            }
        ));
    }

    #[test]
    fn property_paths_are_rejected() {
        let result = rewrite_where("SELECT * WHERE { ?s <urn:p>+ ?o }");
        assert!(matches!(
            result,
            Err(QueryEvaluationError::NotImplemented(_))
        ));
    }
}
