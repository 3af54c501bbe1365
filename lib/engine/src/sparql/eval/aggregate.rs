use super::expression::string_literal;
use crate::sparql::plan::{PlanAggregation, PlanAggregationFunction, Tuple};
use rustc_hash::FxHashSet;
use sparqlite_model::{order_terms, Literal, Numeric, Term, TypedValue};
use std::cmp::Ordering;
use std::sync::Arc;

/// The running state of one aggregate in one group.
///
/// A value that fails to evaluate poisons `SUM`, `AVG` and `GROUP_CONCAT`, whose result is then
/// unbound. `COUNT` skips such values.
pub(super) struct Accumulator {
    state: AccumulatorState,
    distinct: Option<FxHashSet<Vec<Option<Term>>>>,
}

enum AccumulatorState {
    Count(i64),
    Sum(Option<Numeric>),
    Avg { sum: Option<Numeric>, count: i64 },
    Min(Option<Term>),
    Max(Option<Term>),
    Sample(Option<Term>),
    GroupConcat {
        separator: Arc<str>,
        value: Option<String>,
        language: Option<Option<String>>,
    },
}

impl Accumulator {
    pub fn new(aggregation: &PlanAggregation) -> Self {
        let state = match &aggregation.function {
            PlanAggregationFunction::Count => AccumulatorState::Count(0),
            PlanAggregationFunction::Sum => AccumulatorState::Sum(Some(Numeric::Integer(0))),
            PlanAggregationFunction::Avg => AccumulatorState::Avg {
                sum: Some(Numeric::Integer(0)),
                count: 0,
            },
            PlanAggregationFunction::Min => AccumulatorState::Min(None),
            PlanAggregationFunction::Max => AccumulatorState::Max(None),
            PlanAggregationFunction::Sample => AccumulatorState::Sample(None),
            PlanAggregationFunction::GroupConcat { separator } => AccumulatorState::GroupConcat {
                separator: Arc::clone(separator),
                value: Some(String::new()),
                language: None,
            },
        };
        Self {
            state,
            distinct: aggregation.distinct.then(FxHashSet::default),
        }
    }

    /// Adds a solution to `COUNT(*)`.
    pub fn add_solution(&mut self, tuple: &Tuple) {
        if let Some(seen) = &mut self.distinct {
            if !seen.insert(tuple.clone()) {
                return;
            }
        }
        if let AccumulatorState::Count(count) = &mut self.state {
            *count += 1;
        }
    }

    /// Adds the value of the aggregate expression, `None` if it failed to evaluate.
    pub fn add(&mut self, value: Option<Term>) {
        if let Some(seen) = &mut self.distinct {
            if !seen.insert(vec![value.clone()]) {
                return;
            }
        }
        match &mut self.state {
            AccumulatorState::Count(count) => {
                if value.is_some() {
                    *count += 1;
                }
            }
            AccumulatorState::Sum(sum) => {
                *sum = sum.and_then(|sum| sum.checked_add(numeric(value.as_ref())?).ok());
            }
            AccumulatorState::Avg { sum, count } => {
                *sum = sum.and_then(|sum| sum.checked_add(numeric(value.as_ref())?).ok());
                *count += 1;
            }
            AccumulatorState::Min(min) => {
                if let Some(value) = value {
                    if min.is_none()
                        || order_terms(Some(&value), min.as_ref()) == Ordering::Less
                    {
                        *min = Some(value);
                    }
                }
            }
            AccumulatorState::Max(max) => {
                if let Some(value) = value {
                    if max.is_none()
                        || order_terms(Some(&value), max.as_ref()) == Ordering::Greater
                    {
                        *max = Some(value);
                    }
                }
            }
            AccumulatorState::Sample(sample) => {
                if sample.is_none() {
                    *sample = value;
                }
            }
            AccumulatorState::GroupConcat {
                separator,
                value: concatenated,
                language,
            } => {
                let Some(result) = concatenated else {
                    return;
                };
                let Some((text, text_language)) =
                    value.as_ref().and_then(|value| string_literal(value).ok())
                else {
                    *concatenated = None;
                    return;
                };
                if language.is_some() {
                    result.push_str(separator);
                }
                result.push_str(text);
                let text_language = text_language.map(ToOwned::to_owned);
                *language = match language.take() {
                    None => Some(text_language),
                    Some(common) if common == text_language => Some(common),
                    Some(_) => Some(None),
                };
            }
        }
    }

    pub fn finish(self) -> Option<Term> {
        match self.state {
            AccumulatorState::Count(count) => Some(Literal::from(count).into()),
            AccumulatorState::Sum(sum) => sum.map(|sum| sum.into_literal().into()),
            AccumulatorState::Avg { sum, count } => {
                if count == 0 {
                    return Some(Literal::from(0_i64).into());
                }
                let average = sum?.checked_div(Numeric::Integer(count)).ok()?;
                Some(average.into_literal().into())
            }
            AccumulatorState::Min(value)
            | AccumulatorState::Max(value)
            | AccumulatorState::Sample(value) => value,
            AccumulatorState::GroupConcat {
                value, language, ..
            } => {
                let value = value?;
                Some(match language.flatten() {
                    Some(language) => {
                        Literal::new_language_tagged_literal_unchecked(value, language).into()
                    }
                    None => Literal::new_simple_literal(value).into(),
                })
            }
        }
    }
}

fn numeric(value: Option<&Term>) -> Option<Numeric> {
    match TypedValue::from_term(value?.as_ref()) {
        TypedValue::Numeric(value) => Some(value),
        _ => None,
    }
}
