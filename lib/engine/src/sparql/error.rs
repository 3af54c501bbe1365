use oxrdfio::RdfParseError;
use sparqlite_model::NamedNode;
use sparqlite_storage::StorageError;
use spargebra::SparqlSyntaxError;
use std::io;

/// A SPARQL evaluation error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryEvaluationError {
    /// An error in SPARQL parsing.
    #[error(transparent)]
    Parsing(#[from] SparqlSyntaxError),
    /// An error from the storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An error while parsing an external RDF file.
    #[error(transparent)]
    GraphParsing(#[from] RdfParseError),
    /// An error while reading an external RDF file.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error when `CREATE` tries to create an already existing graph
    #[error("The graph {0} already exists")]
    GraphAlreadyExists(NamedNode),
    /// Error when `DROP` or `CLEAR` tries to remove a not existing graph
    #[error("The graph {0} does not exist")]
    GraphDoesNotExist(NamedNode),
    /// The format of a `LOAD` source could not be determined or is not supported.
    #[error("The content media type {0} is not supported")]
    UnsupportedContentType(String),
    /// A statement parameter has no value at execution time.
    #[error("The parameter ~{0} is not bound")]
    UnboundParameter(String),
    /// The evaluation was cancelled through its [`Cancellable`](crate::Cancellable).
    #[error("The evaluation has been cancelled")]
    Cancelled,
    #[error("A feature has not yet been implemented: {0}")]
    NotImplemented(String),
    #[error("An internal error that likely indicates towards a bug in Sparqlite: {0}")]
    InternalError(String),
}
