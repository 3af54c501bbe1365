//! All-or-nothing groups of writes.

use crate::connection::{join_error, upgrade, ConnectionInner};
use crate::error::SparqlError;
use crate::io::{insert_document, RdfFormat};
use crate::statement::Statement;
use sparqlite_engine::{BlankNodeAllocator, CompiledUpdate, ParameterValues};
use sparqlite_model::{
    GraphName, NamedNode, NamedOrBlankNode, Quad, Resource, ResourceError, ResourceStatement,
    Subject,
};
use rustc_hash::FxHashSet;
use sparqlite_storage::MemoryStorageWriter;
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

enum BatchOperation {
    Resource {
        graph: Option<String>,
        resource: Resource,
    },
    Rdf {
        format: RdfFormat,
        graph: Option<String>,
        reader: Box<dyn Read + Send>,
    },
    /// Compiled when the batch runs.
    Sparql { text: String },
    /// Compiled when it was added, with the parameter values of that moment.
    Update {
        update: Arc<CompiledUpdate>,
        values: ParameterValues,
    },
}

impl BatchOperation {
    fn kind(&self) -> &'static str {
        match self {
            Self::Resource { .. } => "resource",
            Self::Rdf { .. } => "rdf",
            Self::Sparql { .. } => "sparql",
            Self::Update { .. } => "update",
        }
    }
}

/// What a committed batch changed in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Quads that were not in the store before the batch.
    pub inserted: usize,
    /// Quads that were in the store before the batch.
    pub removed: usize,
}

/// An ordered list of writes applied in a single transaction.
///
/// Operations only run on [`Batch::execute`]. If one of them fails, nothing of the batch is
/// visible and the error names the failing operation by its position.
///
/// ```
/// use sparqlite::model::Resource;
/// use sparqlite::{Connection, ConnectionOptions, SparqlError, StoreLocation};
///
/// let connection = Connection::open(ConnectionOptions::default(), StoreLocation::Memory, None)?;
///
/// let mut photo = Resource::new(Some("urn:photo"));
/// photo.set_uri("rdf:type", "nfo:Image");
/// photo.set_string("nfo:fileName", "a.png");
///
/// let mut batch = connection.create_batch();
/// batch.add_resource(None, photo);
/// batch.add_sparql("INSERT DATA { <urn:photo> nie:title \"A photo\" }");
/// batch.add_sparql("INSERT DATA { <urn:other> nie:title }");
///
/// let error = batch.execute().unwrap_err();
/// assert!(matches!(error, SparqlError::Batch { index: 2, .. }));
/// let mut cursor = connection.query("SELECT ?p WHERE { <urn:photo> ?p ?o }")?;
/// assert!(!cursor.next()?);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct Batch {
    connection: Weak<ConnectionInner>,
    operations: Vec<BatchOperation>,
}

impl Batch {
    pub(crate) fn new(connection: Weak<ConnectionInner>) -> Self {
        Self {
            connection,
            operations: Vec::new(),
        }
    }

    /// Adds the triples of `resource` to `graph`, or to the default graph.
    ///
    /// Properties set with a `set_*` method replace the values already stored for the resource.
    /// Blank node labels are shared by all the resources of the batch.
    pub fn add_resource(&mut self, graph: Option<&str>, resource: Resource) {
        self.operations.push(BatchOperation::Resource {
            graph: graph.map(str::to_owned),
            resource,
        });
    }

    /// Adds the content of an RDF document to `graph`, or to the default graph.
    ///
    /// Triples go to `graph`; quads of TriG and N-Quads documents keep their own graph. The
    /// document is read when the batch runs.
    pub fn add_rdf(
        &mut self,
        format: RdfFormat,
        reader: impl Read + Send + 'static,
        graph: Option<&str>,
    ) {
        self.operations.push(BatchOperation::Rdf {
            format,
            graph: graph.map(str::to_owned),
            reader: Box::new(reader),
        });
    }

    /// Adds a SPARQL update. It is compiled when the batch runs.
    pub fn add_sparql(&mut self, text: &str) {
        self.operations.push(BatchOperation::Sparql {
            text: text.to_owned(),
        });
    }

    /// Adds a SPARQL update with parameter values. It is compiled immediately.
    pub fn add_update(&mut self, text: &str, values: ParameterValues) -> Result<(), SparqlError> {
        let update = upgrade(&self.connection)?.compile_update(text)?;
        self.operations
            .push(BatchOperation::Update { update, values });
        Ok(())
    }

    /// Adds an update statement with the values bound to it right now.
    pub fn add_statement(&mut self, statement: &Statement) -> Result<(), SparqlError> {
        let (update, values) = statement
            .compiled_update()
            .ok_or(SparqlError::StatementKind {
                expected: "an update",
            })?;
        self.operations.push(BatchOperation::Update {
            update: Arc::clone(update),
            values: values.clone(),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Applies the operations in order and commits them together.
    ///
    /// Fails with [`SparqlError::Batch`] holding the position of the first failing operation, in
    /// which case the store is left as it was.
    pub fn execute(self) -> Result<BatchOutcome, SparqlError> {
        let connection = upgrade(&self.connection)?;
        let mut transaction = connection.begin_write()?;
        let mut runner = BatchRunner {
            connection: &connection,
            resource_blank_nodes: BlankNodeAllocator::new(
                connection.options().anonymous_blank_nodes,
            ),
        };
        let count = self.operations.len();
        for (index, operation) in self.operations.into_iter().enumerate() {
            let kind = operation.kind();
            if let Err(error) = runner.run(transaction.writer(), operation) {
                warn!(index, kind, %error, "Batch operation failed, rolling back");
                transaction.rollback();
                return Err(SparqlError::Batch {
                    index,
                    source: Box::new(error),
                });
            }
        }
        let changes = transaction.commit(connection.notifiers())?;
        debug!(
            operations = count,
            inserted = changes.inserted.len(),
            removed = changes.removed.len(),
            "Executed batch"
        );
        Ok(BatchOutcome {
            inserted: changes.inserted.len(),
            removed: changes.removed.len(),
        })
    }

    /// Runs [`Batch::execute`] on the blocking thread pool of the runtime.
    pub async fn execute_async(self) -> Result<BatchOutcome, SparqlError> {
        tokio::task::spawn_blocking(move || self.execute())
            .await
            .map_err(join_error)?
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field(
                "operations",
                &self
                    .operations
                    .iter()
                    .map(BatchOperation::kind)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

struct BatchRunner<'a> {
    connection: &'a ConnectionInner,
    resource_blank_nodes: BlankNodeAllocator,
}

impl BatchRunner<'_> {
    fn run(
        &mut self,
        writer: &mut MemoryStorageWriter,
        operation: BatchOperation,
    ) -> Result<(), SparqlError> {
        match operation {
            BatchOperation::Resource { graph, resource } => {
                let graph = self.graph_name(graph.as_deref(), resource.identifier())?;
                self.insert_resource(writer, &resource, &graph)
            }
            BatchOperation::Rdf {
                format,
                graph,
                reader,
            } => {
                let graph = self.graph_name(graph.as_deref(), "")?;
                let mut blank_nodes =
                    BlankNodeAllocator::new(self.connection.options().anonymous_blank_nodes);
                insert_document(writer, format, reader, &graph, &mut blank_nodes)?;
                Ok(())
            }
            BatchOperation::Sparql { text } => {
                let update = self.connection.compile_update(&text)?;
                self.execute_update(writer, &update, &ParameterValues::default())
            }
            BatchOperation::Update { update, values } => {
                self.execute_update(writer, &update, &values)
            }
        }
    }

    fn graph_name(&self, graph: Option<&str>, resource: &str) -> Result<GraphName, SparqlError> {
        let Some(graph) = graph else {
            return Ok(GraphName::DefaultGraph);
        };
        let namespaces = self.connection.namespaces();
        let graph = namespaces
            .expand_named_node(graph)
            .map_err(|error| ResourceError::InvalidIri {
                resource: resource.to_owned(),
                iri: namespaces.expand(graph).into_owned(),
                error,
            })?;
        Ok(graph.into())
    }

    fn insert_resource(
        &mut self,
        writer: &mut MemoryStorageWriter,
        resource: &Resource,
        graph: &GraphName,
    ) -> Result<(), SparqlError> {
        let blank_nodes = &mut self.resource_blank_nodes;
        let statements = resource.statements(self.connection.namespaces(), &mut |label| {
            blank_nodes.resolve(label)
        })?;

        {
            let mut overwritten = FxHashSet::<(&NamedOrBlankNode, &NamedNode)>::default();
            for statement in statements.iter().filter(|statement| statement.overwrite) {
                if overwritten.insert((&statement.subject, &statement.predicate)) {
                    remove_values(writer, statement, graph);
                }
            }
        }
        for statement in statements {
            writer.insert(
                Quad::new(
                    statement.subject,
                    statement.predicate,
                    statement.object,
                    graph.clone(),
                )
                .as_ref(),
            );
        }
        if let GraphName::NamedNode(graph) = graph {
            writer.insert_named_graph(graph.as_ref().into());
        }
        Ok(())
    }

    fn execute_update(
        &self,
        writer: &mut MemoryStorageWriter,
        update: &CompiledUpdate,
        values: &ParameterValues,
    ) -> Result<(), SparqlError> {
        update
            .execute(writer, values, &self.connection.evaluation_options(), None)
            .map_err(|error| SparqlError::from_evaluation(error, update.text()))?;
        Ok(())
    }
}

/// Removes the stored values of the subject and predicate of `statement` in `graph`.
fn remove_values(writer: &mut MemoryStorageWriter, statement: &ResourceStatement, graph: &GraphName) {
    let subject = Subject::from(statement.subject.clone());
    let stored = writer
        .reader()
        .quads_for_pattern(
            Some(&subject),
            Some(&statement.predicate),
            None,
            Some(graph),
        )
        .collect::<Vec<_>>();
    for quad in &stored {
        writer.remove(quad.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use crate::{Connection, RdfFormat, SparqlError};
    use sparqlite_model::Resource;

    fn count(connection: &Connection, query: &str) -> i64 {
        let mut cursor = connection.query(query).unwrap();
        assert!(cursor.next().unwrap());
        cursor.get_integer(0).unwrap()
    }

    #[test]
    fn set_properties_replace_stored_values() {
        let connection = Connection::in_memory().unwrap();
        connection
            .update("INSERT DATA { <urn:a> nie:title \"old\" ; nie:comment \"kept\" }")
            .unwrap();

        let mut resource = Resource::new(Some("urn:a"));
        resource.set_string("nie:title", "new");
        let mut batch = connection.create_batch();
        batch.add_resource(None, resource);
        batch.execute().unwrap();

        let mut cursor = connection
            .query("SELECT ?t WHERE { <urn:a> nie:title ?t }")
            .unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_string(0).unwrap(), "new");
        assert!(!cursor.next().unwrap());
        assert_eq!(
            count(&connection, "SELECT (COUNT(*) AS ?c) WHERE { <urn:a> nie:comment ?v }"),
            1
        );
    }

    #[test]
    fn blank_node_labels_are_shared_across_resources() {
        let connection = Connection::in_memory().unwrap();
        let mut folder = Resource::new(Some("_:folder"));
        folder.set_uri("rdf:type", "nfo:Folder");
        let mut file = Resource::new(Some("urn:file"));
        file.set_uri("nie:isPartOf", "_:folder");

        let mut batch = connection.create_batch();
        batch.add_resource(None, folder);
        batch.add_resource(None, file);
        batch.execute().unwrap();

        assert_eq!(
            count(
                &connection,
                "SELECT (COUNT(*) AS ?c) WHERE { <urn:file> nie:isPartOf ?f . ?f a nfo:Folder }"
            ),
            1
        );
    }

    #[test]
    fn invalid_graph_names_fail_the_operation() {
        let connection = Connection::in_memory().unwrap();
        let mut batch = connection.create_batch();
        batch.add_rdf(
            RdfFormat::NTriples,
            "<urn:a> <urn:p> <urn:b> .".as_bytes(),
            None,
        );
        batch.add_resource(Some("not an iri"), Resource::new(Some("urn:a")));
        let error = batch.execute().unwrap_err();
        assert!(matches!(
            &error,
            SparqlError::Batch {
                index: 1,
                source,
            } if matches!(**source, SparqlError::Resource(_))
        ));
        assert_eq!(
            count(&connection, "SELECT (COUNT(*) AS ?c) WHERE { ?s ?p ?o }"),
            0
        );
    }

    #[test]
    fn query_statements_cannot_be_batched() {
        let connection = Connection::in_memory().unwrap();
        let statement = connection.query_statement("ASK { ?s ?p ~o }").unwrap();
        let mut batch = connection.create_batch();
        assert!(matches!(
            batch.add_statement(&statement),
            Err(SparqlError::StatementKind { .. })
        ));
        assert!(batch.is_empty());
    }
}
