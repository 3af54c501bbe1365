use crate::sparql::error::QueryEvaluationError;
use sparqlite_model::{Term, Variable};
use std::fmt;
use std::sync::Arc;

/// One result row: a value per output variable, `None` where the variable is unbound.
pub type QuerySolution = Vec<Option<Term>>;

/// A lazy iterator over the rows of a query execution.
///
/// `SELECT` rows follow the projection. `ASK` yields a single row with a boolean `result`.
/// `CONSTRUCT` and `DESCRIBE` yield `(subject, predicate, object)` rows.
pub struct QuerySolutionIter {
    variables: Arc<[Variable]>,
    iter: Box<dyn Iterator<Item = Result<QuerySolution, QueryEvaluationError>> + Send>,
}

impl QuerySolutionIter {
    pub fn new(
        variables: Arc<[Variable]>,
        iter: impl Iterator<Item = Result<QuerySolution, QueryEvaluationError>> + Send + 'static,
    ) -> Self {
        Self {
            variables,
            iter: Box::new(iter),
        }
    }

    /// The output variables, in column order.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl Iterator for QuerySolutionIter {
    type Item = Result<QuerySolution, QueryEvaluationError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

impl fmt::Debug for QuerySolutionIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySolutionIter")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}
