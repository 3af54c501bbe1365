//! Prepared statements with named parameters.

use crate::connection::{upgrade, ConnectionInner};
use crate::cursor::Cursor;
use crate::error::SparqlError;
use sparqlite_engine::{
    Cancellable, CompiledQuery, CompiledUpdate, ParameterValues, QueryKind, UpdateOutcome,
};
use sparqlite_model::vocab::xsd;
use sparqlite_model::{DateTime, Literal, Term};
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Clone)]
pub(crate) enum CompiledStatement {
    Query(Arc<CompiledQuery>),
    Update(Arc<CompiledUpdate>),
}

/// A compiled query or update that can be executed many times with different parameter values.
///
/// Parameters are written `~name` in the statement text. Values are bound by name and stay bound
/// until they are rebound or [cleared](Statement::clear_bindings); every execution reads the
/// values bound at that moment.
///
/// ```
/// use sparqlite::{Connection, ConnectionOptions, StoreLocation};
///
/// let connection = Connection::open(ConnectionOptions::default(), StoreLocation::Memory, None)?;
/// connection.update(
///     "INSERT DATA { <urn:a> nfo:fileName \"a.png\" . <urn:b> nfo:fileName \"b.png\" }",
/// )?;
///
/// let mut statement = connection.query_statement("SELECT ?u WHERE { ?u nfo:fileName ~name }")?;
/// assert_eq!(statement.parameter_names(), ["name"]);
///
/// statement.bind_string("name", "b.png")?;
/// let mut cursor = statement.execute()?;
/// assert!(cursor.next()?);
/// assert_eq!(cursor.get_iri(0)?, "urn:b");
/// assert!(!cursor.next()?);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Statement {
    connection: Weak<ConnectionInner>,
    compiled: CompiledStatement,
    bindings: ParameterValues,
}

impl Statement {
    pub(crate) fn new(connection: Weak<ConnectionInner>, compiled: CompiledStatement) -> Self {
        Self {
            connection,
            compiled,
            bindings: ParameterValues::default(),
        }
    }

    pub fn text(&self) -> &str {
        match &self.compiled {
            CompiledStatement::Query(query) => query.text(),
            CompiledStatement::Update(update) => update.text(),
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self.compiled, CompiledStatement::Update(_))
    }

    /// The form of a query statement, `None` for updates.
    pub fn query_kind(&self) -> Option<QueryKind> {
        match &self.compiled {
            CompiledStatement::Query(query) => Some(query.kind()),
            CompiledStatement::Update(_) => None,
        }
    }

    /// The parameter names, in order of first appearance.
    pub fn parameter_names(&self) -> &[String] {
        match &self.compiled {
            CompiledStatement::Query(query) => query.parameters(),
            CompiledStatement::Update(update) => update.parameters(),
        }
    }

    /// Binds `value` to the parameter `name`, replacing its previous value.
    pub fn bind(&mut self, name: &str, value: impl Into<Term>) -> Result<(), SparqlError> {
        if !self.parameter_names().iter().any(|parameter| parameter == name) {
            return Err(SparqlError::UnknownParameter(name.to_owned()));
        }
        self.bindings.insert(name.to_owned(), value.into());
        Ok(())
    }

    pub fn bind_string(&mut self, name: &str, value: &str) -> Result<(), SparqlError> {
        self.bind(name, Literal::new_simple_literal(value))
    }

    pub fn bind_integer(&mut self, name: &str, value: i64) -> Result<(), SparqlError> {
        self.bind(name, Literal::from(value))
    }

    pub fn bind_double(&mut self, name: &str, value: f64) -> Result<(), SparqlError> {
        self.bind(name, Literal::from(value))
    }

    pub fn bind_boolean(&mut self, name: &str, value: bool) -> Result<(), SparqlError> {
        self.bind(name, Literal::from(value))
    }

    pub fn bind_datetime(&mut self, name: &str, value: DateTime) -> Result<(), SparqlError> {
        self.bind(
            name,
            Literal::new_typed_literal(value.to_string(), xsd::DATE_TIME),
        )
    }

    pub fn bind_lang_string(
        &mut self,
        name: &str,
        value: &str,
        language: &str,
    ) -> Result<(), SparqlError> {
        let literal = Literal::new_language_tagged_literal(value, language).map_err(|error| {
            SparqlError::InvalidBinding {
                name: name.to_owned(),
                message: error.to_string(),
            }
        })?;
        self.bind(name, literal)
    }

    /// Binds a resource. Prefixed names are expanded with the namespaces of the connection.
    pub fn bind_iri(&mut self, name: &str, iri: &str) -> Result<(), SparqlError> {
        let connection = upgrade(&self.connection)?;
        let node = connection
            .namespaces()
            .expand_named_node(iri)
            .map_err(|error| SparqlError::InvalidBinding {
                name: name.to_owned(),
                message: error.to_string(),
            })?;
        self.bind(name, node)
    }

    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    /// Executes a query statement.
    pub fn execute(&self) -> Result<Cursor, SparqlError> {
        self.execute_inner(None)
    }

    /// Executes a query statement that stops once `cancellable` is cancelled.
    pub fn execute_with(&self, cancellable: &Cancellable) -> Result<Cursor, SparqlError> {
        self.execute_inner(Some(cancellable.clone()))
    }

    fn execute_inner(&self, cancellable: Option<Cancellable>) -> Result<Cursor, SparqlError> {
        let CompiledStatement::Query(query) = &self.compiled else {
            return Err(SparqlError::StatementKind { expected: "a query" });
        };
        let connection = upgrade(&self.connection)?;
        connection.execute_query(query, &self.bindings, cancellable)
    }

    /// Executes an update statement in its own transaction.
    pub fn update(&self) -> Result<UpdateOutcome, SparqlError> {
        let CompiledStatement::Update(update) = &self.compiled else {
            return Err(SparqlError::StatementKind {
                expected: "an update",
            });
        };
        upgrade(&self.connection)?.execute_update(update, &self.bindings)
    }

    pub(crate) fn compiled_update(&self) -> Option<(&Arc<CompiledUpdate>, &ParameterValues)> {
        match &self.compiled {
            CompiledStatement::Update(update) => Some((update, &self.bindings)),
            CompiledStatement::Query(_) => None,
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("text", &self.text())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}
