//! A pull-based evaluator of [`PlanNode`]s over a storage snapshot.
//!
//! Every node is evaluated with a `from` tuple holding the bindings already known (at the root,
//! the parameter values). Evaluation is lazy except for the operators that need to see all their
//! input (`ORDER BY`, `GROUP BY`, the right side of `MINUS` and of `OPTIONAL`).

mod aggregate;
mod expression;

use crate::cancellable::Cancellable;
use crate::sparql::error::QueryEvaluationError;
use crate::sparql::plan::{Comparator, DatasetSpec, PatternValue, PlanGraph, PlanNode, Tuple};
use aggregate::Accumulator;
use regex::{Regex, RegexBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use sparqlite_model::{order_terms, DateTime, GraphName, NamedNode, Quad, Subject, Term};
use sparqlite_storage::MemoryStorageReader;
use std::cmp::Ordering;
use std::iter::{empty, once};
use std::sync::Arc;

pub use expression::current_date_time;

pub type TupleIter = Box<dyn Iterator<Item = Result<Tuple, QueryEvaluationError>> + Send>;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// Compiles a SPARQL regular expression with its flags.
///
/// Returns `None` for invalid patterns or unknown flags.
pub fn build_regex(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    if let Some(flags) = flags {
        for flag in flags.chars() {
            match flag {
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                'i' => {
                    builder.case_insensitive(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'q' => {
                    builder = RegexBuilder::new(&regex::escape(pattern));
                    builder.size_limit(REGEX_SIZE_LIMIT);
                }
                _ => return None,
            }
        }
    }
    builder.build().ok()
}

#[derive(Clone)]
pub struct SimpleEvaluator {
    reader: MemoryStorageReader,
    dataset: Arc<DatasetSpec>,
    union_default_graph: bool,
    seed: Arc<[Option<Term>]>,
    cancellable: Option<Cancellable>,
    now: Option<DateTime>,
    blank_node_salt: u64,
}

impl SimpleEvaluator {
    pub fn new(
        reader: MemoryStorageReader,
        dataset: DatasetSpec,
        union_default_graph: bool,
        seed: Tuple,
        cancellable: Option<Cancellable>,
    ) -> Self {
        Self {
            reader,
            dataset: Arc::new(dataset),
            union_default_graph,
            seed: seed.into(),
            cancellable,
            now: current_date_time(),
            blank_node_salt: rand_u64(),
        }
    }

    /// A fresh tuple holding the parameter values.
    pub fn seed(&self) -> Tuple {
        self.seed.to_vec()
    }

    pub fn eval_plan(&self, node: &Arc<PlanNode>, from: Tuple) -> TupleIter {
        match node.as_ref() {
            PlanNode::StaticBindings { tuples } => Box::new(
                tuples
                    .iter()
                    .filter_map(|tuple| combine_tuples(tuple, &from))
                    .map(Ok)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            PlanNode::QuadPattern {
                subject,
                predicate,
                object,
                graph_name,
            } => self.eval_quad_pattern(subject, predicate, object, graph_name, from),
            PlanNode::Join { left, right } => {
                let eval = self.clone();
                let right = Arc::clone(right);
                Box::new(
                    self.eval_plan(left, from)
                        .flat_map(move |tuple| -> TupleIter {
                            match tuple {
                                Ok(tuple) => eval.eval_plan(&right, tuple),
                                Err(error) => Box::new(once(Err(error))),
                            }
                        }),
                )
            }
            PlanNode::LeftJoin {
                left,
                right,
                expression,
            } => {
                let eval = self.clone();
                let right = Arc::clone(right);
                let expression = expression.clone();
                Box::new(
                    self.eval_plan(left, from)
                        .flat_map(move |tuple| -> TupleIter {
                            let left_tuple = match tuple {
                                Ok(tuple) => tuple,
                                Err(error) => return Box::new(once(Err(error))),
                            };
                            let mut results = Vec::new();
                            for tuple in eval.eval_plan(&right, left_tuple.clone()) {
                                match tuple {
                                    Ok(tuple) => {
                                        if expression
                                            .as_ref()
                                            .map_or(true, |e| eval.eval_ebv(e, &tuple))
                                        {
                                            results.push(Ok(tuple));
                                        }
                                    }
                                    Err(error) => {
                                        results.push(Err(error));
                                        break;
                                    }
                                }
                            }
                            if results.is_empty() {
                                results.push(Ok(left_tuple));
                            }
                            Box::new(results.into_iter())
                        }),
                )
            }
            PlanNode::Filter { child, expression } => {
                let eval = self.clone();
                let expression = Arc::clone(expression);
                Box::new(self.eval_plan(child, from).filter(move |tuple| match tuple {
                    Ok(tuple) => eval.eval_ebv(&expression, tuple),
                    Err(_) => true,
                }))
            }
            PlanNode::Union { children } => {
                let eval = self.clone();
                let children = children.clone();
                Box::new(
                    (0..children.len())
                        .flat_map(move |i| eval.eval_plan(&children[i], from.clone())),
                )
            }
            PlanNode::Extend {
                child,
                position,
                expression,
            } => {
                let eval = self.clone();
                let position = *position;
                let expression = Arc::clone(expression);
                Box::new(self.eval_plan(child, from).filter_map(move |tuple| {
                    let mut tuple = match tuple {
                        Ok(tuple) => tuple,
                        Err(error) => return Some(Err(error)),
                    };
                    if let Ok(value) = eval.eval_expression(&expression, &tuple) {
                        // A value bound by the enclosing join must agree with the new one
                        match get_value(position, &tuple) {
                            Some(existing) if *existing != value => return None,
                            Some(_) => (),
                            None => put_value(position, value, &mut tuple),
                        }
                    }
                    Some(Ok(tuple))
                }))
            }
            PlanNode::Minus { left, right } => {
                let right = match self
                    .eval_plan(right, self.seed())
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(right) => right,
                    Err(error) => return Box::new(once(Err(error))),
                };
                let first_variable = self.seed.len();
                Box::new(self.eval_plan(left, from).filter(move |tuple| match tuple {
                    Ok(tuple) => !right
                        .iter()
                        .any(|r| are_compatible_and_not_disjointed(tuple, r, first_variable)),
                    Err(_) => true,
                }))
            }
            PlanNode::Sort { child, by } => {
                let mut values = match self.eval_plan(child, from).collect::<Result<Vec<_>, _>>() {
                    Ok(values) => values,
                    Err(error) => return Box::new(once(Err(error))),
                };
                values.sort_by(|a, b| self.compare_tuples(by, a, b));
                Box::new(values.into_iter().map(Ok))
            }
            PlanNode::HashDeduplicate { child } => {
                let mut seen = FxHashSet::default();
                Box::new(self.eval_plan(child, from).filter(move |tuple| match tuple {
                    Ok(tuple) => seen.insert(tuple.clone()),
                    Err(_) => true,
                }))
            }
            PlanNode::Skip { child, count } => Box::new(self.eval_plan(child, from).skip(*count)),
            PlanNode::Limit { child, count } => Box::new(self.eval_plan(child, from).take(*count)),
            PlanNode::Project { child, mapping } => {
                let mapping = Arc::clone(mapping);
                Box::new(
                    self.eval_plan(child, self.seed())
                        .filter_map(move |tuple| match tuple {
                            Ok(inner) => {
                                let mut outer = from.clone();
                                for (inner_slot, outer_slot) in mapping.iter() {
                                    let Some(value) = get_value(*inner_slot, &inner) else {
                                        continue;
                                    };
                                    match get_value(*outer_slot, &outer) {
                                        Some(existing) if existing != value => return None,
                                        Some(_) => (),
                                        None => put_value(*outer_slot, value.clone(), &mut outer),
                                    }
                                }
                                Some(Ok(outer))
                            }
                            Err(error) => Some(Err(error)),
                        }),
                )
            }
            PlanNode::Aggregate {
                child,
                key_mapping,
                aggregates,
            } => {
                let tuples = match self
                    .eval_plan(child, from.clone())
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(tuples) => tuples,
                    Err(error) => return Box::new(once(Err(error))),
                };
                let new_accumulators = || {
                    aggregates
                        .iter()
                        .map(|(aggregation, _)| Accumulator::new(aggregation))
                        .collect::<Vec<_>>()
                };

                let mut groups: Vec<(Vec<Option<Term>>, Vec<Accumulator>)> = Vec::new();
                let mut group_index: FxHashMap<Vec<Option<Term>>, usize> = FxHashMap::default();
                if key_mapping.is_empty() {
                    // Without GROUP BY there is exactly one group, even for an empty input.
                    groups.push((Vec::new(), new_accumulators()));
                    group_index.insert(Vec::new(), 0);
                }
                for tuple in &tuples {
                    let key = key_mapping
                        .iter()
                        .map(|slot| get_value(*slot, tuple).cloned())
                        .collect::<Vec<_>>();
                    let index = *group_index.entry(key.clone()).or_insert_with(|| {
                        groups.push((key, new_accumulators()));
                        groups.len() - 1
                    });
                    for ((aggregation, _), accumulator) in
                        aggregates.iter().zip(&mut groups[index].1)
                    {
                        match &aggregation.parameter {
                            Some(parameter) => {
                                accumulator.add(self.eval_expression(parameter, tuple).ok());
                            }
                            None => accumulator.add_solution(tuple),
                        }
                    }
                }

                let results = groups
                    .into_iter()
                    .map(|(key, accumulators)| {
                        let mut result = from.clone();
                        for (slot, value) in key_mapping.iter().zip(key) {
                            if let Some(value) = value {
                                put_value(*slot, value, &mut result);
                            }
                        }
                        for ((_, slot), accumulator) in aggregates.iter().zip(accumulators) {
                            if let Some(value) = accumulator.finish() {
                                put_value(*slot, value, &mut result);
                            }
                        }
                        Ok(result)
                    })
                    .collect::<Vec<_>>();
                Box::new(results.into_iter())
            }
        }
    }

    fn eval_quad_pattern(
        &self,
        subject: &PatternValue,
        predicate: &PatternValue,
        object: &PatternValue,
        graph_name: &PlanGraph,
        from: Tuple,
    ) -> TupleIter {
        let subject_filter = match get_pattern_value(subject, &from) {
            None => None,
            Some(Term::NamedNode(node)) => Some(Subject::from(node.clone())),
            Some(Term::BlankNode(node)) => Some(Subject::from(node.clone())),
            Some(Term::Literal(_)) => return Box::new(empty()),
        };
        let predicate_filter = match get_pattern_value(predicate, &from) {
            None => None,
            Some(Term::NamedNode(node)) => Some(node.clone()),
            Some(_) => return Box::new(empty()),
        };
        let object_filter = get_pattern_value(object, &from).cloned();

        let quads = self.scan(
            subject_filter.as_ref(),
            predicate_filter.as_ref(),
            object_filter.as_ref(),
            graph_name,
            &from,
        );
        let subject = subject.clone();
        let predicate = predicate.clone();
        let object = object.clone();
        let graph_name = graph_name.clone();
        let cancellable = self.cancellable.clone();
        Box::new(quads.filter_map(move |quad| {
            if let Some(cancellable) = &cancellable {
                if let Err(error) = cancellable.check() {
                    return Some(Err(error));
                }
            }
            let mut tuple = from.clone();
            put_pattern_value(&subject, quad.subject.into(), &mut tuple)?;
            put_pattern_value(&predicate, quad.predicate.into(), &mut tuple)?;
            put_pattern_value(&object, quad.object, &mut tuple)?;
            if let PlanGraph::Named(graph_pattern) = &graph_name {
                let graph = match quad.graph_name {
                    GraphName::NamedNode(node) => Term::from(node),
                    GraphName::BlankNode(node) => Term::from(node),
                    GraphName::DefaultGraph => return None,
                };
                put_pattern_value(graph_pattern, graph, &mut tuple)?;
            }
            Some(Ok(tuple))
        }))
    }

    /// Resolves the graphs a pattern reads from against the dataset.
    fn scan(
        &self,
        subject: Option<&Subject>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph_name: &PlanGraph,
        from: &Tuple,
    ) -> Box<dyn Iterator<Item = Quad> + Send> {
        match graph_name {
            PlanGraph::Default => match &self.dataset.default {
                Some(graphs) if graphs.len() == 1 => Box::new(self.reader.quads_for_pattern(
                    subject,
                    predicate,
                    object,
                    Some(&graphs[0]),
                )),
                Some(graphs) => deduplicate_triples(Box::new(
                    graphs
                        .iter()
                        .map(|graph| {
                            self.reader
                                .quads_for_pattern(subject, predicate, object, Some(graph))
                        })
                        .collect::<Vec<_>>()
                        .into_iter()
                        .flatten(),
                )),
                None if self.union_default_graph => deduplicate_triples(Box::new(
                    self.reader.quads_for_pattern(subject, predicate, object, None),
                )),
                None => Box::new(self.reader.quads_for_pattern(
                    subject,
                    predicate,
                    object,
                    Some(&GraphName::DefaultGraph),
                )),
            },
            PlanGraph::Named(graph) => {
                let graph = match get_pattern_value(graph, from) {
                    Some(Term::NamedNode(node)) => GraphName::from(node.clone()),
                    Some(Term::BlankNode(node)) => GraphName::from(node.clone()),
                    Some(Term::Literal(_)) => return Box::new(empty()),
                    None => {
                        return match &self.dataset.named {
                            Some(graphs) => Box::new(
                                graphs
                                    .iter()
                                    .map(|graph| {
                                        self.reader.quads_for_pattern(
                                            subject,
                                            predicate,
                                            object,
                                            Some(&graph.clone().into()),
                                        )
                                    })
                                    .collect::<Vec<_>>()
                                    .into_iter()
                                    .flatten(),
                            ),
                            None => Box::new(
                                self.reader
                                    .quads_for_pattern(subject, predicate, object, None)
                                    .filter(|quad| !quad.graph_name.is_default_graph()),
                            ),
                        };
                    }
                };
                if let Some(named) = &self.dataset.named {
                    if !named.iter().any(|n| GraphName::from(n.clone()) == graph) {
                        return Box::new(empty());
                    }
                }
                Box::new(
                    self.reader
                        .quads_for_pattern(subject, predicate, object, Some(&graph)),
                )
            }
        }
    }

    fn compare_tuples(&self, by: &[Comparator], a: &Tuple, b: &Tuple) -> Ordering {
        for comparator in by {
            let ordering = match comparator {
                Comparator::Asc(expression) => order_terms(
                    self.eval_expression(expression, a).ok().as_ref(),
                    self.eval_expression(expression, b).ok().as_ref(),
                ),
                Comparator::Desc(expression) => order_terms(
                    self.eval_expression(expression, b).ok().as_ref(),
                    self.eval_expression(expression, a).ok().as_ref(),
                ),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn deduplicate_triples(
    quads: Box<dyn Iterator<Item = Quad> + Send>,
) -> Box<dyn Iterator<Item = Quad> + Send> {
    let mut seen = FxHashSet::default();
    Box::new(quads.filter(move |quad| {
        seen.insert((
            quad.subject.clone(),
            quad.predicate.clone(),
            quad.object.clone(),
        ))
    }))
}

fn rand_u64() -> u64 {
    let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
    high ^ low
}

pub(crate) fn get_value(position: usize, tuple: &Tuple) -> Option<&Term> {
    tuple.get(position).and_then(Option::as_ref)
}

pub(crate) fn put_value(position: usize, value: Term, tuple: &mut Tuple) {
    if tuple.len() <= position {
        tuple.resize(position + 1, None);
    }
    tuple[position] = Some(value);
}

pub(crate) fn get_pattern_value<'a>(value: &'a PatternValue, tuple: &'a Tuple) -> Option<&'a Term> {
    match value {
        PatternValue::Constant(term) => Some(term),
        PatternValue::Variable(position) => get_value(*position, tuple),
    }
}

/// Binds `value` to a variable pattern. Returns `None` on a conflicting binding.
fn put_pattern_value(pattern: &PatternValue, value: Term, tuple: &mut Tuple) -> Option<()> {
    match pattern {
        PatternValue::Constant(_) => Some(()),
        PatternValue::Variable(position) => match get_value(*position, tuple) {
            Some(existing) if *existing != value => None,
            Some(_) => Some(()),
            None => {
                put_value(*position, value, tuple);
                Some(())
            }
        },
    }
}

fn combine_tuples(a: &Tuple, b: &Tuple) -> Option<Tuple> {
    let (mut result, other) = if a.len() >= b.len() {
        (a.clone(), b)
    } else {
        (b.clone(), a)
    };
    for (position, value) in other.iter().enumerate() {
        let Some(value) = value else {
            continue;
        };
        match &result[position] {
            Some(existing) if existing != value => return None,
            Some(_) => (),
            None => result[position] = Some(value.clone()),
        }
    }
    Some(result)
}

/// `MINUS` removes left solutions that agree with a right solution on at least one shared
/// variable. Parameter slots (below `first_variable`) are bound everywhere and do not count.
fn are_compatible_and_not_disjointed(a: &Tuple, b: &Tuple, first_variable: usize) -> bool {
    let mut shared = false;
    for (a, b) in a.iter().zip(b).skip(first_variable) {
        if let (Some(a), Some(b)) = (a, b) {
            if a != b {
                return false;
            }
            shared = true;
        }
    }
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_model::NamedNode;

    fn term(iri: &str) -> Option<Term> {
        Some(NamedNode::new_unchecked(iri).into())
    }

    #[test]
    fn regex_flags() {
        assert!(build_regex("^abc$", Some("i")).is_some_and(|r| r.is_match("ABC")));
        assert!(build_regex("a.c", Some("q")).is_some_and(|r| !r.is_match("abc")));
        assert!(build_regex("a", Some("z")).is_none());
        assert!(build_regex("(", None).is_none());
    }

    #[test]
    fn tuples_combine_when_compatible() {
        let a = vec![term("urn:a"), None];
        let b = vec![None, term("urn:b"), term("urn:c")];
        assert_eq!(
            combine_tuples(&a, &b),
            Some(vec![term("urn:a"), term("urn:b"), term("urn:c")])
        );
        assert_eq!(combine_tuples(&a, &vec![term("urn:x")]), None);
    }

    #[test]
    fn minus_ignores_parameter_slots() {
        let left = vec![term("urn:p"), term("urn:a")];
        let same_parameter_only = vec![term("urn:p"), None];
        let shared = vec![term("urn:p"), term("urn:a")];
        assert!(!are_compatible_and_not_disjointed(&left, &same_parameter_only, 1));
        assert!(are_compatible_and_not_disjointed(&left, &shared, 1));
    }
}
