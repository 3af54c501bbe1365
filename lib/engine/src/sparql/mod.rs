//! [SPARQL](https://www.w3.org/TR/sparql11-overview/) statement compilation and evaluation.
//!
//! Statements are compiled once by a [`StatementCompiler`] and executed any number of times with
//! different parameter values.

mod cache;
mod error;
mod eval;
pub mod parameters;
mod plan;
mod results;
mod rewriting;
mod statement;
mod template;
mod update;

pub use crate::sparql::cache::StatementCache;
pub use crate::sparql::error::QueryEvaluationError;
pub use crate::sparql::eval::current_date_time;
pub use crate::sparql::plan::DatasetSpec;
pub use crate::sparql::results::{QuerySolution, QuerySolutionIter};
pub use crate::sparql::statement::{
    CompiledQuery, CompiledUpdate, EvaluationOptions, ParameterValues, QueryKind,
    StatementCompiler,
};
pub use crate::sparql::update::UpdateOutcome;
pub use spargebra::SparqlSyntaxError;
