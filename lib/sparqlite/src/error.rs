use crate::config::ConfigError;
use crate::cursor::ValueType;
use oxrdfio::RdfParseError;
use sparqlite_engine::QueryEvaluationError;
use sparqlite_model::ResourceError;
use sparqlite_storage::StorageError;
use spargebra::SparqlSyntaxError;
use std::io;
use std::time::Duration;

/// How much of a statement text is kept in errors.
const SNIPPET_LENGTH: usize = 80;

/// An error raised by a [`Connection`](crate::Connection) or one of its children.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SparqlError {
    /// The statement text is not valid SPARQL.
    #[error("Syntax error in '{statement}': {source}")]
    Syntax {
        /// The beginning of the failing statement.
        statement: String,
        #[source]
        source: SparqlSyntaxError,
    },
    /// A value was bound to a name that is not a parameter of the statement.
    #[error("The statement has no parameter ~{0}")]
    UnknownParameter(String),
    /// A parameter had no value when the statement was executed.
    #[error("The parameter ~{0} is not bound")]
    UnboundParameter(String),
    /// The value given for a parameter is not a valid term.
    #[error("Invalid value for the parameter ~{name}: {message}")]
    InvalidBinding { name: String, message: String },
    /// A cursor getter does not match the type of the cell.
    #[error("Column {column} holds a value of type {actual}, not {expected}")]
    TypeMismatch {
        column: usize,
        expected: ValueType,
        actual: ValueType,
    },
    /// A cursor column that does not exist or a read without a current row.
    #[error("Column {column} is not available, the current row has {columns} columns")]
    InvalidColumn { column: usize, columns: usize },
    /// An RDF document could not be parsed. Positions are 1-based.
    #[error("{}", rdf_parse_message(.line, .column, .message))]
    RdfParse {
        line: Option<u64>,
        column: Option<u64>,
        message: String,
    },
    /// A resource could not be turned into triples.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The operation `index` of a batch failed, the whole batch has been rolled back.
    #[error("Batch operation {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<SparqlError>,
    },
    /// The write slot could not be acquired in time.
    #[error("The write transaction could not begin within {0:?}")]
    TransactionTimeout(Duration),
    /// A change notification callback tried to write through its connection.
    #[error("Change notification callbacks cannot begin a transaction on their connection")]
    Reentrancy,
    /// The current thread already runs a write transaction on this connection.
    #[error("A write transaction is already in progress on this thread")]
    TransactionInProgress,
    /// The connection has been closed.
    #[error("The connection is closed")]
    ClosedConnection,
    /// The connection was opened read-only.
    #[error("The connection is read-only")]
    ReadOnly,
    /// A query statement was used as an update or the opposite.
    #[error("Expected {expected} statement")]
    StatementKind { expected: &'static str },
    /// The operation was cancelled.
    #[error("The operation has been cancelled")]
    Cancelled,
    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Any other evaluation error.
    #[error(transparent)]
    Evaluation(QueryEvaluationError),
    /// The connection could not be opened.
    #[error("Failed to open the connection: {0}")]
    Open(#[source] OpenError),
}

/// The reason why [`Connection::open`](crate::Connection::open) failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An ontology document could not be read or parsed.
    #[error("Invalid ontology {path}: {source}")]
    Ontology {
        path: String,
        #[source]
        source: Box<SparqlError>,
    },
}

impl SparqlError {
    /// Converts an engine error raised by the statement `text`.
    pub(crate) fn from_evaluation(error: QueryEvaluationError, text: &str) -> Self {
        match error {
            QueryEvaluationError::Parsing(source) => Self::Syntax {
                statement: snippet(text),
                source,
            },
            QueryEvaluationError::UnboundParameter(name) => Self::UnboundParameter(name),
            QueryEvaluationError::Cancelled => Self::Cancelled,
            QueryEvaluationError::Storage(error) => Self::Storage(error),
            QueryEvaluationError::GraphParsing(error) => error.into(),
            error => Self::Evaluation(error),
        }
    }

    /// The error behind batch and ontology wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Batch { source, .. } => source.root_cause(),
            Self::Open(OpenError::Ontology { source, .. }) => source.root_cause(),
            error => error,
        }
    }
}

impl From<RdfParseError> for SparqlError {
    fn from(error: RdfParseError) -> Self {
        match error {
            RdfParseError::Io(error) => Self::Io(error),
            RdfParseError::Syntax(error) => {
                let start = error.location().map(|location| location.start);
                Self::RdfParse {
                    line: start.as_ref().map(|position| position.line + 1),
                    column: start.as_ref().map(|position| position.column + 1),
                    message: error.to_string(),
                }
            }
        }
    }
}

impl From<OpenError> for SparqlError {
    fn from(error: OpenError) -> Self {
        Self::Open(error)
    }
}

impl From<SparqlError> for io::Error {
    #[inline]
    fn from(error: SparqlError) -> Self {
        match error {
            SparqlError::Io(error) => error,
            SparqlError::Storage(error) => error.into(),
            SparqlError::RdfParse { .. } | SparqlError::Syntax { .. } => {
                Self::new(io::ErrorKind::InvalidData, error.to_string())
            }
            SparqlError::TransactionTimeout(_) => {
                Self::new(io::ErrorKind::TimedOut, error.to_string())
            }
            error => Self::other(error),
        }
    }
}

fn rdf_parse_message(line: &Option<u64>, column: &Option<u64>, message: &str) -> String {
    match (line, column) {
        (Some(line), Some(column)) => {
            format!("RDF parse error at line {line}, column {column}: {message}")
        }
        _ => format!("RDF parse error: {message}"),
    }
}

fn snippet(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(SNIPPET_LENGTH) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_keep_the_beginning_of_the_statement() {
        let text = format!("SELECT * WHERE {{ {} ", "?s ?p ?o . ".repeat(20));
        let Err(QueryEvaluationError::Parsing(source)) =
            sparqlite_engine::StatementCompiler::default().compile_query(&text)
        else {
            panic!("the query should not parse");
        };
        let SparqlError::Syntax { statement, .. } =
            SparqlError::from_evaluation(QueryEvaluationError::Parsing(source), &text)
        else {
            panic!("expected a syntax error");
        };
        assert!(statement.ends_with("..."));
        assert!(statement.starts_with("SELECT * WHERE"));
        assert_eq!(statement.chars().count(), SNIPPET_LENGTH + 3);
    }

    #[test]
    fn batch_errors_expose_their_root_cause() {
        let error = SparqlError::Batch {
            index: 2,
            source: Box::new(SparqlError::UnknownParameter("name".into())),
        };
        assert!(matches!(
            error.root_cause(),
            SparqlError::UnknownParameter(name) if name == "name"
        ));
        assert_eq!(
            error.to_string(),
            "Batch operation 2 failed: The statement has no parameter ~name"
        );
    }

    #[test]
    fn rdf_parse_messages_mention_positions() {
        let error = SparqlError::RdfParse {
            line: Some(3),
            column: Some(7),
            message: "unexpected end".into(),
        };
        assert_eq!(
            error.to_string(),
            "RDF parse error at line 3, column 7: unexpected end"
        );
    }
}
