mod blank_nodes;
mod cancellable;
pub mod sparql;

pub use blank_nodes::{BlankNodeAllocator, BlankNodeLabels};
pub use cancellable::Cancellable;
pub use sparql::{
    CompiledQuery, CompiledUpdate, EvaluationOptions, ParameterValues, QueryEvaluationError,
    QueryKind, QuerySolution, QuerySolutionIter, StatementCache, StatementCompiler,
    UpdateOutcome,
};
