//! Forward-only iteration over query results.

use crate::connection::ConnectionInner;
use crate::error::SparqlError;
use futures::Stream;
use sparqlite_engine::{Cancellable, QuerySolution, QuerySolutionIter};
use sparqlite_model::{
    BlankNode, DateTime, Literal, NamedNode, Numeric, Term, TypedValue, Variable,
};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// The type of a result cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Unbound,
    Uri,
    BlankNode,
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unbound => "unbound",
            Self::Uri => "uri",
            Self::BlankNode => "blank node",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
        })
    }
}

/// A typed result cell.
///
/// Literals are classified by datatype: every numeric type but `xsd:integer` and its subtypes
/// is a [`CellValue::Double`], and literals of other datatypes are strings holding their lexical
/// form.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Unbound,
    Uri(NamedNode),
    BlankNode(BlankNode),
    String {
        value: String,
        language: Option<String>,
    },
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime),
}

impl CellValue {
    pub fn from_term(term: Option<&Term>) -> Self {
        let Some(term) = term else {
            return Self::Unbound;
        };
        match TypedValue::from_term(term.as_ref()) {
            TypedValue::NamedNode(node) => Self::Uri(node),
            TypedValue::BlankNode(node) => Self::BlankNode(node),
            TypedValue::Boolean(value) => Self::Boolean(value),
            TypedValue::Numeric(Numeric::Integer(value)) => Self::Integer(value),
            TypedValue::Numeric(value) => Self::Double(value.as_f64()),
            TypedValue::SimpleLiteral(value) => Self::String {
                value,
                language: None,
            },
            TypedValue::LanguageString { value, language } => Self::String {
                value,
                language: Some(language),
            },
            TypedValue::DateTime(value) => Self::DateTime(value),
            TypedValue::OtherLiteral(literal) => Self::String {
                value: literal.value().to_owned(),
                language: None,
            },
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Unbound => ValueType::Unbound,
            Self::Uri(_) => ValueType::Uri,
            Self::BlankNode(_) => ValueType::BlankNode,
            Self::String { .. } => ValueType::String,
            Self::Integer(_) => ValueType::Integer,
            Self::Double(_) => ValueType::Double,
            Self::Boolean(_) => ValueType::Boolean,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    OnRow,
    Exhausted,
}

/// A forward-only iterator over the rows of a query execution.
///
/// Rows are computed lazily by [`Cursor::next`]. The snapshot the query reads is released when
/// the cursor is exhausted, closed or dropped. A cursor fails with
/// [`SparqlError::ClosedConnection`] once its connection is closed.
///
/// ```
/// use sparqlite::{Connection, ConnectionOptions, StoreLocation};
///
/// let connection = Connection::open(ConnectionOptions::default(), StoreLocation::Memory, None)?;
/// connection.update("INSERT DATA { <urn:a> nfo:fileName \"a.png\" }")?;
///
/// let mut cursor = connection.query("SELECT ?u ?name WHERE { ?u nfo:fileName ?name }")?;
/// while cursor.next()? {
///     assert_eq!(cursor.get_iri(0)?, "urn:a");
///     assert_eq!(cursor.get_string(1)?, "a.png");
/// }
/// cursor.close();
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Cursor {
    connection: Weak<ConnectionInner>,
    statement: Arc<str>,
    variables: Arc<[Variable]>,
    solutions: Option<QuerySolutionIter>,
    current: QuerySolution,
    state: CursorState,
    cancellable: Option<Cancellable>,
}

impl Cursor {
    pub(crate) fn new(
        connection: Weak<ConnectionInner>,
        statement: Arc<str>,
        solutions: QuerySolutionIter,
        cancellable: Option<Cancellable>,
    ) -> Self {
        Self {
            connection,
            statement,
            variables: solutions.variables().into(),
            solutions: Some(solutions),
            current: QuerySolution::new(),
            state: CursorState::BeforeFirst,
            cancellable,
        }
    }

    pub fn n_columns(&self) -> usize {
        self.variables.len()
    }

    pub fn variable_name(&self, column: usize) -> Option<&str> {
        self.variables.get(column).map(Variable::as_str)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Advances to the next row.
    ///
    /// Returns `false` once the results are exhausted or the cursor is closed. After an error the
    /// cursor stays exhausted.
    pub fn next(&mut self) -> Result<bool, SparqlError> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        let result = self.advance();
        if !matches!(result, Ok(true)) {
            self.exhaust();
        }
        result
    }

    fn advance(&mut self) -> Result<bool, SparqlError> {
        match self.connection.upgrade() {
            Some(connection) if !connection.is_closed() => (),
            _ => return Err(SparqlError::ClosedConnection),
        }
        if self
            .cancellable
            .as_ref()
            .is_some_and(Cancellable::is_cancelled)
        {
            return Err(SparqlError::Cancelled);
        }
        let Some(solutions) = &mut self.solutions else {
            return Ok(false);
        };
        match solutions.next() {
            Some(Ok(row)) => {
                self.current = row;
                self.state = CursorState::OnRow;
                Ok(true)
            }
            Some(Err(error)) => Err(SparqlError::from_evaluation(error, &self.statement)),
            None => Ok(false),
        }
    }

    /// Advances to the next row, yielding to the async runtime first.
    ///
    /// The row itself is computed on the calling task. If `cancellable` is cancelled the cursor
    /// is closed and the call fails with [`SparqlError::Cancelled`].
    pub async fn next_async(
        &mut self,
        cancellable: Option<&Cancellable>,
    ) -> Result<bool, SparqlError> {
        tokio::task::yield_now().await;
        if cancellable.is_some_and(Cancellable::is_cancelled) {
            self.close();
            return Err(SparqlError::Cancelled);
        }
        self.next()
    }

    /// Turns the cursor into a stream of materialized rows.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<CellValue>, SparqlError>> {
        futures::stream::unfold(self, |mut cursor| async move {
            match cursor.next_async(None).await {
                Ok(true) => {
                    let row = cursor.row();
                    Some((Ok(row), cursor))
                }
                Ok(false) => None,
                Err(error) => Some((Err(error), cursor)),
            }
        })
    }

    /// Releases the results. Closing twice has no effect.
    pub fn close(&mut self) {
        if self.state != CursorState::Exhausted {
            debug!("Closed cursor");
        }
        self.exhaust();
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    fn exhaust(&mut self) {
        self.state = CursorState::Exhausted;
        self.solutions = None;
        self.current.clear();
    }

    /// The raw term of `column` in the current row.
    pub fn term(&self, column: usize) -> Result<Option<&Term>, SparqlError> {
        match self.current.get(column) {
            Some(term) => Ok(term.as_ref()),
            None => Err(SparqlError::InvalidColumn {
                column,
                columns: self.current.len(),
            }),
        }
    }

    pub fn is_bound(&self, column: usize) -> bool {
        matches!(self.current.get(column), Some(Some(_)))
    }

    pub fn value(&self, column: usize) -> Result<CellValue, SparqlError> {
        Ok(CellValue::from_term(self.term(column)?))
    }

    pub fn value_type(&self, column: usize) -> Result<ValueType, SparqlError> {
        Ok(self.value(column)?.value_type())
    }

    /// The current row as typed cells.
    pub fn row(&self) -> Vec<CellValue> {
        self.current
            .iter()
            .map(|term| CellValue::from_term(term.as_ref()))
            .collect()
    }

    /// The value of a string cell, without its language tag.
    pub fn get_string(&self, column: usize) -> Result<&str, SparqlError> {
        Ok(self.string_literal(column)?.value())
    }

    pub fn get_language(&self, column: usize) -> Result<Option<&str>, SparqlError> {
        Ok(self.string_literal(column)?.language())
    }

    fn string_literal(&self, column: usize) -> Result<&Literal, SparqlError> {
        match self.term(column)? {
            Some(Term::Literal(literal))
                if matches!(
                    TypedValue::from_literal(literal.as_ref()),
                    TypedValue::SimpleLiteral(_)
                        | TypedValue::LanguageString { .. }
                        | TypedValue::OtherLiteral(_)
                ) =>
            {
                Ok(literal)
            }
            _ => Err(self.mismatch(column, ValueType::String)),
        }
    }

    pub fn get_integer(&self, column: usize) -> Result<i64, SparqlError> {
        match self.value(column)? {
            CellValue::Integer(value) => Ok(value),
            _ => Err(self.mismatch(column, ValueType::Integer)),
        }
    }

    /// The value of a numeric cell. Integers are converted.
    pub fn get_double(&self, column: usize) -> Result<f64, SparqlError> {
        match self.value(column)? {
            CellValue::Double(value) => Ok(value),
            CellValue::Integer(value) => Ok(Numeric::Integer(value).as_f64()),
            _ => Err(self.mismatch(column, ValueType::Double)),
        }
    }

    pub fn get_boolean(&self, column: usize) -> Result<bool, SparqlError> {
        match self.value(column)? {
            CellValue::Boolean(value) => Ok(value),
            _ => Err(self.mismatch(column, ValueType::Boolean)),
        }
    }

    pub fn get_datetime(&self, column: usize) -> Result<DateTime, SparqlError> {
        match self.value(column)? {
            CellValue::DateTime(value) => Ok(value),
            _ => Err(self.mismatch(column, ValueType::DateTime)),
        }
    }

    /// The IRI of a resource cell.
    pub fn get_iri(&self, column: usize) -> Result<&str, SparqlError> {
        match self.term(column)? {
            Some(Term::NamedNode(node)) => Ok(node.as_str()),
            _ => Err(self.mismatch(column, ValueType::Uri)),
        }
    }

    fn mismatch(&self, column: usize, expected: ValueType) -> SparqlError {
        SparqlError::TypeMismatch {
            column,
            expected,
            actual: self
                .value_type(column)
                .unwrap_or(ValueType::Unbound),
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("variables", &self.variables)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_model::vocab::xsd;

    #[test]
    fn literals_are_classified_by_datatype() {
        let cell = |term: Term| CellValue::from_term(Some(&term)).value_type();
        assert_eq!(cell(Literal::from(3).into()), ValueType::Integer);
        assert_eq!(
            cell(Literal::new_typed_literal("1.5", xsd::DECIMAL).into()),
            ValueType::Double
        );
        assert_eq!(cell(Literal::from(true).into()), ValueType::Boolean);
        assert_eq!(
            cell(Literal::new_typed_literal("2024-01-01T00:00:00Z", xsd::DATE_TIME).into()),
            ValueType::DateTime
        );
        assert_eq!(
            cell(Literal::new_typed_literal("P1D", xsd::DURATION).into()),
            ValueType::String
        );
        assert_eq!(
            cell(NamedNode::new_unchecked("urn:a").into()),
            ValueType::Uri
        );
        assert_eq!(CellValue::from_term(None), CellValue::Unbound);
    }

    #[test]
    fn language_strings_keep_their_tag() {
        let term = Literal::new_language_tagged_literal_unchecked("chat", "fr").into();
        assert_eq!(
            CellValue::from_term(Some(&term)),
            CellValue::String {
                value: "chat".into(),
                language: Some("fr".into())
            }
        );
    }
}
