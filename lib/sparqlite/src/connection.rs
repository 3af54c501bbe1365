//! The entry point of the crate.
//!
//! A [`Connection`] owns a store and everything derived from it: the namespaces, the compiled
//! statement caches, the write transaction discipline and the change notification subscribers.

use crate::batch::Batch;
use crate::config::{ConnectionOptions, StoreLocation};
use crate::cursor::Cursor;
use crate::error::{OpenError, SparqlError};
use crate::notifier::{Notifier, NotifierRegistry};
use crate::ontology::{load_ontology, register_prefixes};
use crate::statement::{CompiledStatement, Statement};
use crate::transaction::{TransactionManager, WriteTransaction};
use sparqlite_engine::{
    BlankNodeLabels, Cancellable, CompiledQuery, CompiledUpdate, EvaluationOptions,
    ParameterValues, QueryEvaluationError, StatementCache, StatementCompiler, UpdateOutcome,
};
use sparqlite_model::NamespaceManager;
use sparqlite_storage::MemoryStorage;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinError;
use tracing::{debug, info};

/// A connection to a SPARQL store.
///
/// Queries run on a snapshot of the latest commit and never wait for writers. Updates and batches
/// run in write transactions, one at a time. Every object created from the connection
/// ([`Statement`], [`Cursor`], [`Batch`], [`Notifier`]) fails with
/// [`SparqlError::ClosedConnection`] once the connection is closed.
///
/// ```
/// use sparqlite::{Connection, ConnectionOptions, StoreLocation};
///
/// let connection = Connection::open(ConnectionOptions::default(), StoreLocation::Memory, None)?;
/// connection.update("INSERT DATA { <urn:photo> a nfo:Image ; nfo:fileName \"a.png\" }")?;
///
/// let mut cursor = connection.query("SELECT ?name WHERE { ?u a nfo:Image ; nfo:fileName ?name }")?;
/// assert!(cursor.next()?);
/// assert_eq!(cursor.get_string(0)?, "a.png");
///
/// connection.close();
/// assert!(connection.query("ASK { ?s ?p ?o }").is_err());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// The state shared by a connection and its children.
///
/// Children hold it weakly: a dropped connection fails them the same way a closed one does.
pub(crate) struct ConnectionInner {
    options: ConnectionOptions,
    location: StoreLocation,
    namespaces: Arc<NamespaceManager>,
    compiler: StatementCompiler,
    queries: StatementCache<CompiledQuery>,
    updates: StatementCache<CompiledUpdate>,
    transactions: TransactionManager,
    notifiers: Arc<NotifierRegistry>,
    closed: AtomicBool,
}

impl ConnectionInner {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn notifiers(&self) -> &NotifierRegistry {
        &self.notifiers
    }

    pub fn evaluation_options(&self) -> EvaluationOptions {
        self.options.evaluation_options()
    }

    fn check_open(&self) -> Result<(), SparqlError> {
        if self.is_closed() {
            Err(SparqlError::ClosedConnection)
        } else {
            Ok(())
        }
    }

    /// Fails if the connection cannot write.
    pub fn check_writable(&self) -> Result<(), SparqlError> {
        self.check_open()?;
        if self.options.read_only {
            return Err(SparqlError::ReadOnly);
        }
        Ok(())
    }

    /// Begins a write transaction.
    ///
    /// A writer that waited for the slot while the connection was being closed gets
    /// [`SparqlError::ClosedConnection`] and its transaction is rolled back.
    pub fn begin_write(&self) -> Result<WriteTransaction<'_>, SparqlError> {
        self.check_writable()?;
        let transaction = self.transactions.begin()?;
        if self.is_closed() {
            transaction.rollback();
            return Err(SparqlError::ClosedConnection);
        }
        Ok(transaction)
    }

    pub fn compile_query(&self, text: &str) -> Result<Arc<CompiledQuery>, SparqlError> {
        self.check_open()?;
        self.queries
            .get_or_compile(text, |text| self.compiler.compile_query(text))
            .map_err(|error| SparqlError::from_evaluation(error, text))
    }

    pub fn compile_update(&self, text: &str) -> Result<Arc<CompiledUpdate>, SparqlError> {
        self.check_open()?;
        self.updates
            .get_or_compile(text, |text| self.compiler.compile_update(text))
            .map_err(|error| SparqlError::from_evaluation(error, text))
    }

    /// Runs `query` on a snapshot of the latest commit.
    pub fn execute_query(
        self: &Arc<Self>,
        query: &CompiledQuery,
        values: &ParameterValues,
        cancellable: Option<Cancellable>,
    ) -> Result<Cursor, SparqlError> {
        self.check_open()?;
        let solutions = query
            .execute(
                self.transactions.snapshot(),
                values,
                &self.evaluation_options(),
                cancellable.clone(),
            )
            .map_err(|error| SparqlError::from_evaluation(error, query.text()))?;
        Ok(Cursor::new(
            Arc::downgrade(self),
            query.text().into(),
            solutions,
            cancellable,
        ))
    }

    /// Runs `update` in its own write transaction.
    pub fn execute_update(
        &self,
        update: &CompiledUpdate,
        values: &ParameterValues,
    ) -> Result<UpdateOutcome, SparqlError> {
        let mut transaction = self.begin_write()?;
        match update.execute(
            transaction.writer(),
            values,
            &self.evaluation_options(),
            None,
        ) {
            Ok(outcome) => {
                transaction.commit(&self.notifiers)?;
                Ok(outcome)
            }
            Err(error) => {
                transaction.rollback();
                Err(SparqlError::from_evaluation(error, update.text()))
            }
        }
    }

    /// Marks the connection closed. Returns `false` if it already was.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.transactions.wait_idle();
        self.queries.clear();
        self.updates.clear();
        self.notifiers.clear();
        true
    }
}

/// Fails with [`SparqlError::ClosedConnection`] if the connection is gone or closed.
pub(crate) fn upgrade(
    connection: &Weak<ConnectionInner>,
) -> Result<Arc<ConnectionInner>, SparqlError> {
    match connection.upgrade() {
        Some(connection) if !connection.is_closed() => Ok(connection),
        _ => Err(SparqlError::ClosedConnection),
    }
}

impl Connection {
    /// Opens a connection.
    ///
    /// A store without any data is first filled with the ontology at `ontology`, either a Turtle
    /// file or a directory of `.ttl` and `.ontology` files. The `nrl:prefix` declarations found
    /// in the store are added to the default namespaces.
    pub fn open(
        options: ConnectionOptions,
        location: StoreLocation,
        ontology: Option<&Path>,
    ) -> Result<Self, SparqlError> {
        let storage = match &location {
            StoreLocation::Memory => MemoryStorage::new(),
            StoreLocation::Path(path) => {
                MemoryStorage::open(path, options.sync_on_commit).map_err(OpenError::from)?
            }
        };
        let transactions = TransactionManager::new(storage, options.write_timeout());

        if let Some(ontology) = ontology {
            if transactions.snapshot().is_empty() {
                load_ontology(&transactions, ontology, options.anonymous_blank_nodes)?;
            } else {
                debug!(
                    path = %ontology.display(),
                    "The store already holds data, the ontology is not loaded"
                );
            }
        }

        let mut namespaces = NamespaceManager::default();
        register_prefixes(&transactions.snapshot(), &mut namespaces);
        let namespaces = Arc::new(namespaces);

        info!(
            location = ?location,
            read_only = options.read_only,
            quads = transactions.snapshot().len(),
            "Opened connection"
        );
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                compiler: StatementCompiler::new(Arc::clone(&namespaces)),
                queries: StatementCache::new(options.statement_cache_capacity),
                updates: StatementCache::new(options.statement_cache_capacity),
                namespaces,
                transactions,
                notifiers: Arc::new(NotifierRegistry::default()),
                closed: AtomicBool::new(false),
                options,
                location,
            }),
        })
    }

    /// Opens an empty in-memory connection with the default options.
    pub fn in_memory() -> Result<Self, SparqlError> {
        Self::open(ConnectionOptions::default(), StoreLocation::Memory, None)
    }

    pub fn options(&self) -> &ConnectionOptions {
        self.inner.options()
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// The prefixes expanded in statements and resources.
    pub fn namespaces(&self) -> &NamespaceManager {
        self.inner.namespaces()
    }

    /// Compiles a query into a statement with `~name` parameters.
    pub fn query_statement(&self, text: &str) -> Result<Statement, SparqlError> {
        let query = self.inner.compile_query(text)?;
        Ok(Statement::new(
            Arc::downgrade(&self.inner),
            CompiledStatement::Query(query),
        ))
    }

    /// Compiles an update into a statement with `~name` parameters.
    pub fn update_statement(&self, text: &str) -> Result<Statement, SparqlError> {
        let update = self.inner.compile_update(text)?;
        Ok(Statement::new(
            Arc::downgrade(&self.inner),
            CompiledStatement::Update(update),
        ))
    }

    /// Runs a query without parameters.
    pub fn query(&self, text: &str) -> Result<Cursor, SparqlError> {
        let query = self.inner.compile_query(text)?;
        self.inner
            .execute_query(&query, &ParameterValues::default(), None)
    }

    /// Runs a query that stops producing rows once `cancellable` is cancelled.
    pub fn query_with(&self, text: &str, cancellable: &Cancellable) -> Result<Cursor, SparqlError> {
        let query = self.inner.compile_query(text)?;
        self.inner.execute_query(
            &query,
            &ParameterValues::default(),
            Some(cancellable.clone()),
        )
    }

    /// Compiles and starts a query on the blocking thread pool of the runtime.
    pub async fn query_async(
        &self,
        text: &str,
        cancellable: Option<Cancellable>,
    ) -> Result<Cursor, SparqlError> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || {
            if cancellable.as_ref().is_some_and(Cancellable::is_cancelled) {
                return Err(SparqlError::Cancelled);
            }
            let query = inner.compile_query(&text)?;
            inner.execute_query(&query, &ParameterValues::default(), cancellable)
        })
        .await
        .map_err(join_error)?
    }

    /// Runs an update without parameters in its own transaction.
    pub fn update(&self, text: &str) -> Result<UpdateOutcome, SparqlError> {
        self.inner.check_writable()?;
        let update = self.inner.compile_update(text)?;
        self.inner
            .execute_update(&update, &ParameterValues::default())
    }

    /// Runs an update and returns the identifiers given to its blank nodes.
    ///
    /// There is one label map per blank node producing application: each `INSERT DATA` and each
    /// solution of an `INSERT ... WHERE`.
    pub fn update_blank(&self, text: &str) -> Result<Vec<BlankNodeLabels>, SparqlError> {
        Ok(self.update(text)?.blank_nodes)
    }

    /// Runs an update on the blocking thread pool of the runtime.
    pub async fn update_async(&self, text: &str) -> Result<UpdateOutcome, SparqlError> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || {
            inner.check_writable()?;
            let update = inner.compile_update(&text)?;
            inner.execute_update(&update, &ParameterValues::default())
        })
        .await
        .map_err(join_error)?
    }

    /// Starts an empty batch.
    pub fn create_batch(&self) -> Batch {
        Batch::new(Arc::downgrade(&self.inner))
    }

    /// Creates a notifier receiving the changes of every later commit.
    pub fn create_notifier(&self) -> Result<Notifier, SparqlError> {
        self.inner.check_open()?;
        Ok(Notifier::new(
            Arc::clone(&self.inner.notifiers),
            Arc::downgrade(&self.inner),
        ))
    }

    /// Closes the connection.
    ///
    /// Waits for a running write transaction, then drops the cached statements and the
    /// notification subscribers. Closing twice has no effect.
    pub fn close(&self) {
        if self.inner.close() {
            info!(location = ?self.inner.location, "Closed connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("location", &self.inner.location)
            .field("options", &self.inner.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

pub(crate) fn join_error(error: JoinError) -> SparqlError {
    SparqlError::Evaluation(QueryEvaluationError::InternalError(format!(
        "The blocking task failed: {error}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn statements_are_cached_by_text() {
        let connection = Connection::in_memory().unwrap();
        let first = connection.inner.compile_query("ASK { ?s ?p ?o }").unwrap();
        let second = connection.inner.compile_query("ASK { ?s ?p ?o }").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connection.inner.queries.len(), 1);

        connection.close();
        assert!(connection.inner.queries.is_empty());
    }

    #[test]
    fn a_disabled_cache_keeps_nothing() {
        let connection = Connection::open(
            ConnectionOptions::default().with_statement_cache_capacity(0),
            StoreLocation::Memory,
            None,
        )
        .unwrap();
        connection.query("ASK { ?s ?p ?o }").unwrap();
        assert!(connection.inner.queries.is_empty());
    }

    #[test]
    fn read_only_connections_reject_writes() {
        let connection = Connection::open(
            ConnectionOptions::default().with_read_only(true),
            StoreLocation::Memory,
            None,
        )
        .unwrap();
        assert!(matches!(
            connection.update("INSERT DATA { <urn:a> <urn:p> <urn:b> }"),
            Err(SparqlError::ReadOnly)
        ));
        assert!(connection.query("ASK { ?s ?p ?o }").is_ok());
    }

    #[test]
    fn writers_waiting_during_close_do_not_commit() {
        let connection = Connection::in_memory().unwrap();
        let update = connection
            .inner
            .compile_update("INSERT DATA { <urn:a> <urn:p> <urn:b> }")
            .unwrap();
        let transaction = connection.inner.begin_write().unwrap();

        let result = thread::scope(|scope| {
            let writer = scope.spawn(|| {
                connection
                    .inner
                    .execute_update(&update, &ParameterValues::default())
            });
            thread::sleep(Duration::from_millis(50));
            assert!(connection.inner.close());
            transaction.rollback();
            writer.join().unwrap()
        });

        assert!(matches!(result, Err(SparqlError::ClosedConnection)));
        assert!(connection.inner.transactions.snapshot().is_empty());
    }
}
