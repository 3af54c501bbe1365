#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

use proptest::prelude::*;
use sparqlite::model::{DateTime, NamedNode, Resource, Term};
use sparqlite::{
    Cancellable, CellValue, Connection, ConnectionOptions, EventType, ParameterValues, RdfFormat,
    SparqlError, StoreLocation, ValueType,
};
use std::error::Error;
use std::fs;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PHOTOS: &str = r#"
    INSERT DATA {
        <urn:photo:1> a nfo:Image ; nfo:fileName "photo.jpg" ; nfo:width 640 .
        <urn:photo:2> a nfo:Image ; nfo:fileName "other.jpg" ; nfo:width 1024 .
        <urn:photo:3> a nfo:Image ; nfo:fileName "third.jpg" ; nfo:width 32 .
    }
"#;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sparqlite=debug,sparqlite_engine=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn connection() -> Result<Connection, Box<dyn Error>> {
    init_tracing();
    Ok(Connection::open(
        ConnectionOptions::default(),
        StoreLocation::Memory,
        None,
    )?)
}

/// All the rows of `query`, rendered as terms.
fn rows(connection: &Connection, query: &str) -> Result<Vec<Vec<String>>, Box<dyn Error>> {
    let mut cursor = connection.query(query)?;
    let mut rows = Vec::new();
    while cursor.next()? {
        let mut row = Vec::new();
        for column in 0..cursor.n_columns() {
            row.push(cursor.term(column)?.map_or_else(String::new, Term::to_string));
        }
        rows.push(row);
    }
    rows.sort();
    Ok(rows)
}

fn ask(connection: &Connection, query: &str) -> Result<bool, Box<dyn Error>> {
    let mut cursor = connection.query(query)?;
    assert!(cursor.next()?);
    Ok(cursor.get_boolean(0)?)
}

#[test]
fn inserted_resources_can_be_queried() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update("INSERT { <urn:a> a <urn:Thing> }")?;

    let mut cursor = connection.query("SELECT ?s WHERE { ?s a <urn:Thing> }")?;
    assert_eq!(cursor.n_columns(), 1);
    assert_eq!(cursor.variable_name(0), Some("s"));
    assert!(cursor.next()?);
    assert_eq!(cursor.get_iri(0)?, "urn:a");
    assert!(!cursor.next()?);
    Ok(())
}

#[test]
fn failed_batches_leave_the_store_untouched() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let before = rows(&connection, "SELECT ?s ?p ?o WHERE { ?s ?p ?o }")?;

    let mut document = Resource::new(Some("urn:r1"));
    document.set_uri("rdf:type", "nfo:Document");
    document.set_string("nie:title", "Report");
    let mut overwrite = Resource::new(Some("urn:photo:1"));
    overwrite.set_string("nfo:fileName", "renamed.jpg");

    let mut batch = connection.create_batch();
    batch.add_resource(None, document);
    batch.add_resource(None, overwrite);
    batch.add_sparql("INSERT DATA { <urn:r2> a }");
    assert_eq!(batch.len(), 3);

    let error = batch.execute().unwrap_err();
    let SparqlError::Batch { index, source } = &error else {
        panic!("unexpected error {error}");
    };
    assert_eq!(*index, 2);
    assert!(matches!(**source, SparqlError::Syntax { .. }));

    assert!(!ask(&connection, "ASK { <urn:r1> ?p ?o }")?);
    assert_eq!(
        rows(&connection, "SELECT ?s ?p ?o WHERE { ?s ?p ?o }")?,
        before
    );
    Ok(())
}

#[test]
fn malformed_updates_fail_at_their_batch_index() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut resource = Resource::new(Some("urn:r1"));
    resource.set_uri("rdf:type", "nfo:Document");

    let mut batch = connection.create_batch();
    batch.add_resource(None, resource);
    batch.add_sparql("INSERT DATA { <urn:a> <urn:p> ");
    assert!(matches!(
        batch.execute(),
        Err(SparqlError::Batch { index: 1, .. })
    ));
    assert!(!ask(&connection, "ASK { <urn:r1> ?p ?o }")?);
    Ok(())
}

#[test]
fn rebinding_replaces_the_previous_value() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;

    let mut statement = connection.query_statement("SELECT ?u WHERE {?u nfo:fileName ~name}")?;
    statement.bind_string("name", "photo.jpg")?;
    let mut cursor = statement.execute()?;
    assert!(cursor.next()?);
    assert_eq!(cursor.get_iri(0)?, "urn:photo:1");
    assert!(!cursor.next()?);

    statement.bind_string("name", "other.jpg")?;
    let mut cursor = statement.execute()?;
    assert!(cursor.next()?);
    assert_eq!(cursor.get_iri(0)?, "urn:photo:2");
    assert!(!cursor.next()?);
    Ok(())
}

#[test]
fn notifiers_receive_one_create_event_per_new_resource() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let notifier = connection.create_notifier()?;
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    notifier.subscribe(move |service, graph, events| {
        assert_eq!(service, None);
        sink.lock().unwrap().push((graph.clone(), events.to_vec()));
    })?;

    let mut resource = Resource::new(Some("urn:a"));
    resource.set_uri("rdf:type", "nfo:Document");
    let mut batch = connection.create_batch();
    batch.add_resource(None, resource);
    let outcome = batch.execute()?;
    assert_eq!(outcome.inserted, 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (graph, events) = &calls[0];
    assert!(graph.is_default_graph());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Create);
    assert_eq!(events[0].subject.to_string(), "<urn:a>");
    Ok(())
}

#[test]
fn change_events_are_typed_by_predicate() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let notifier = connection.create_notifier()?;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    notifier.subscribe(move |_, _, changes| {
        sink.lock().unwrap().extend(
            changes
                .iter()
                .map(|event| (event.subject.to_string(), event.event_type)),
        );
    })?;

    connection.update("DELETE { <urn:photo:1> nfo:width ?w } INSERT { <urn:photo:1> nfo:width 10 } WHERE { <urn:photo:1> nfo:width ?w }")?;
    connection.update("DELETE WHERE { <urn:photo:2> a ?type }")?;
    // A no-op commit notifies nobody
    connection.update("INSERT DATA { <urn:photo:3> nfo:width 32 }")?;

    assert_eq!(
        *events.lock().unwrap(),
        [
            ("<urn:photo:1>".to_owned(), EventType::Update),
            ("<urn:photo:2>".to_owned(), EventType::Delete),
        ]
    );
    Ok(())
}

#[test]
fn notifier_callbacks_cannot_write_through_their_connection() -> Result<(), Box<dyn Error>> {
    let connection = Arc::new(connection()?);
    let notifier = connection.create_notifier()?;
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let weak = Arc::downgrade(&connection);
    notifier.subscribe(move |_, _, _| {
        if let Some(connection) = weak.upgrade() {
            let nested = connection.update("INSERT DATA { <urn:nested> a nfo:Document }");
            sink.lock().unwrap().push(matches!(nested, Err(SparqlError::Reentrancy)));
            // Reads stay allowed
            sink.lock()
                .unwrap()
                .push(connection.query("ASK { <urn:a> ?p ?o }").is_ok());
        }
    })?;

    connection.update("INSERT DATA { <urn:a> a nfo:Document }")?;
    assert_eq!(*results.lock().unwrap(), [true, true]);
    assert!(!ask(&connection, "ASK { <urn:nested> ?p ?o }")?);
    Ok(())
}

#[test]
fn dropped_notifiers_stop_receiving_events() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let calls = Arc::new(Mutex::new(0));
    let notifier = connection.create_notifier()?;
    let sink = Arc::clone(&calls);
    let id = notifier.subscribe(move |_, _, _| *sink.lock().unwrap() += 1)?;

    connection.update("INSERT DATA { <urn:a> a nfo:Document }")?;
    assert!(notifier.unsubscribe(id));
    assert!(!notifier.unsubscribe(id));
    connection.update("INSERT DATA { <urn:b> a nfo:Document }")?;

    let sink = Arc::clone(&calls);
    notifier.subscribe(move |_, _, _| *sink.lock().unwrap() += 1)?;
    drop(notifier);
    connection.update("INSERT DATA { <urn:c> a nfo:Document }")?;
    assert_eq!(*calls.lock().unwrap(), 1);
    Ok(())
}

#[test]
fn closing_is_idempotent_and_fails_children() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let mut statement = connection.query_statement("SELECT ?u WHERE { ?u nfo:fileName ~name }")?;
    statement.bind_string("name", "photo.jpg")?;
    let mut cursor = connection.query("SELECT ?u WHERE { ?u a nfo:Image }")?;
    let mut batch = connection.create_batch();
    batch.add_sparql("INSERT DATA { <urn:a> a nfo:Document }");
    let notifier = connection.create_notifier()?;

    connection.close();
    connection.close();
    assert!(connection.is_closed());

    assert!(matches!(statement.execute(), Err(SparqlError::ClosedConnection)));
    assert!(matches!(
        statement.bind_iri("name", "urn:a"),
        Err(SparqlError::ClosedConnection)
    ));
    assert!(matches!(cursor.next(), Err(SparqlError::ClosedConnection)));
    assert!(!cursor.next()?);
    assert!(matches!(batch.execute(), Err(SparqlError::ClosedConnection)));
    assert!(matches!(
        notifier.subscribe(|_, _, _| ()),
        Err(SparqlError::ClosedConnection)
    ));
    assert!(matches!(
        connection.query("ASK { ?s ?p ?o }"),
        Err(SparqlError::ClosedConnection)
    ));
    assert!(matches!(
        connection.update("INSERT DATA { <urn:a> a nfo:Document }"),
        Err(SparqlError::ClosedConnection)
    ));
    assert!(connection.create_notifier().is_err());
    Ok(())
}

#[test]
fn closing_a_cursor_twice_is_harmless() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let mut cursor = connection.query("SELECT ?u WHERE { ?u a nfo:Image }")?;
    assert!(cursor.next()?);
    cursor.close();
    cursor.close();
    assert!(cursor.is_closed());
    assert!(!cursor.next()?);
    assert!(matches!(
        cursor.get_iri(0),
        Err(SparqlError::InvalidColumn { column: 0, .. })
    ));
    Ok(())
}

#[test]
fn cursors_expose_typed_values() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(
        r#"INSERT DATA {
            <urn:a> nie:title "Chat"@fr ;
                nfo:width 640 ;
                nfo:aspectRatio 1.5e0 ;
                nfo:isPrivate true ;
                nie:created "2024-05-01T10:00:00Z"^^xsd:dateTime .
        }"#,
    )?;

    let mut cursor = connection.query(
        "SELECT ?title ?width ?ratio ?private ?created ?missing WHERE {
            <urn:a> nie:title ?title ; nfo:width ?width ; nfo:aspectRatio ?ratio ;
                nfo:isPrivate ?private ; nie:created ?created .
            OPTIONAL { <urn:a> nie:comment ?missing }
        }",
    )?;
    assert!(cursor.next()?);
    assert_eq!(cursor.get_string(0)?, "Chat");
    assert_eq!(cursor.get_language(0)?, Some("fr"));
    assert_eq!(cursor.get_integer(1)?, 640);
    assert!((cursor.get_double(1)? - 640.0).abs() < f64::EPSILON);
    assert!((cursor.get_double(2)? - 1.5).abs() < f64::EPSILON);
    assert!(cursor.get_boolean(3)?);
    assert_eq!(
        cursor.get_datetime(4)?,
        DateTime::from_str("2024-05-01T10:00:00Z")?
    );
    assert!(!cursor.is_bound(5));
    assert_eq!(cursor.value(5)?, CellValue::Unbound);
    assert!(matches!(
        cursor.get_integer(0),
        Err(SparqlError::TypeMismatch {
            column: 0,
            expected: ValueType::Integer,
            actual: ValueType::String,
        })
    ));
    assert!(matches!(
        cursor.get_string(9),
        Err(SparqlError::InvalidColumn { column: 9, .. })
    ));
    Ok(())
}

#[test]
fn parameter_errors_name_the_parameter() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut statement =
        connection.query_statement("SELECT ?u WHERE { ?u nfo:width ~width ; nfo:fileName ~name }")?;
    assert_eq!(statement.parameter_names(), ["width", "name"]);

    assert!(matches!(
        statement.bind_integer("height", 3),
        Err(SparqlError::UnknownParameter(name)) if name == "height"
    ));
    statement.bind_integer("width", 3)?;
    assert!(matches!(
        statement.execute(),
        Err(SparqlError::UnboundParameter(name)) if name == "name"
    ));
    assert!(matches!(
        statement.bind_lang_string("name", "x", "not a tag"),
        Err(SparqlError::InvalidBinding { .. })
    ));
    assert!(matches!(
        statement.update(),
        Err(SparqlError::StatementKind { .. })
    ));
    Ok(())
}

#[test]
fn syntax_errors_carry_the_statement() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let Err(SparqlError::Syntax { statement, .. }) =
        connection.query("SELECT ?s WHERE { ?s ?p }")
    else {
        panic!("the query should not compile");
    };
    assert_eq!(statement, "SELECT ?s WHERE { ?s ?p }");
    Ok(())
}

#[test]
fn update_statements_accept_parameters_in_data_blocks() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut statement =
        connection.update_statement("INSERT DATA { ~photo a nfo:Image ; nfo:fileName ~name }")?;
    assert!(statement.is_update());
    for (photo, name) in [("urn:photo:1", "a.jpg"), ("nfo:photo2", "b.jpg")] {
        statement.bind_iri("photo", photo)?;
        statement.bind_string("name", name)?;
        assert_eq!(statement.update()?.inserted, 2);
    }
    assert_eq!(
        rows(&connection, "SELECT ?u ?n WHERE { ?u nfo:fileName ?n }")?,
        [
            vec![
                "<http://tracker.api.gnome.org/ontology/v3/nfo#photo2>".to_owned(),
                "\"b.jpg\"".to_owned()
            ],
            vec!["<urn:photo:1>".to_owned(), "\"a.jpg\"".to_owned()],
        ]
    );
    Ok(())
}

#[test]
fn update_blank_reports_generated_identifiers() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let labels = connection.update_blank(
        "INSERT DATA { _:folder a nfo:Folder . _:file a nfo:FileDataObject ; nie:isPartOf _:folder }",
    )?;
    assert_eq!(labels.len(), 1);
    let folder = labels[0]["folder"].to_string();
    assert!(folder.starts_with("<urn:bnode:"));
    assert_ne!(folder, labels[0]["file"].to_string());

    assert!(ask(&connection, &format!("ASK {{ {folder} a nfo:Folder }}"))?);
    assert!(ask(
        &connection,
        &format!("ASK {{ ?file nie:isPartOf {folder} }}")
    )?);
    Ok(())
}

#[test]
fn anonymous_blank_nodes_stay_blank() -> Result<(), Box<dyn Error>> {
    let connection = Connection::open(
        ConnectionOptions::default().with_anonymous_blank_nodes(true),
        StoreLocation::Memory,
        None,
    )?;
    connection.update("INSERT DATA { _:x a nfo:Folder }")?;
    assert!(ask(
        &connection,
        "ASK { ?x a nfo:Folder FILTER(isBlank(?x)) }"
    )?);
    Ok(())
}

#[test]
fn rdf_documents_are_loaded_into_their_graph() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut batch = connection.create_batch();
    batch.add_rdf(
        RdfFormat::Turtle,
        "@prefix nfo: <http://tracker.api.gnome.org/ontology/v3/nfo#> . <urn:a> a nfo:Image ."
            .as_bytes(),
        Some("urn:graph:turtle"),
    );
    batch.add_rdf(
        RdfFormat::JsonLd,
        r#"{
            "@context": { "nfo": "http://tracker.api.gnome.org/ontology/v3/nfo#" },
            "@id": "urn:b",
            "@type": "nfo:Image",
            "nfo:fileName": "b.png"
        }"#
        .as_bytes(),
        Some("urn:graph:json"),
    );
    let outcome = batch.execute()?;
    assert_eq!(outcome.inserted, 3);

    assert_eq!(
        rows(&connection, "SELECT ?g ?s WHERE { GRAPH ?g { ?s a nfo:Image } }")?,
        [
            vec!["<urn:graph:json>".to_owned(), "<urn:b>".to_owned()],
            vec!["<urn:graph:turtle>".to_owned(), "<urn:a>".to_owned()],
        ]
    );
    Ok(())
}

#[test]
fn invalid_rdf_reports_its_position() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut batch = connection.create_batch();
    batch.add_rdf(
        RdfFormat::NTriples,
        "<urn:a> <urn:p> <urn:b> .\n<urn:a> <urn:p> .\n".as_bytes(),
        None,
    );
    let error = batch.execute().unwrap_err();
    assert!(matches!(
        error.root_cause(),
        SparqlError::RdfParse { line: Some(2), .. }
    ));
    assert!(!ask(&connection, "ASK { <urn:a> ?p ?o }")?);
    Ok(())
}

#[test]
fn eager_batch_updates_keep_their_values() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let mut statement =
        connection.update_statement("INSERT DATA { ~photo nfo:fileName ~name }")?;
    statement.bind_iri("photo", "urn:photo:1")?;
    statement.bind_string("name", "first.jpg")?;

    let mut batch = connection.create_batch();
    batch.add_statement(&statement)?;
    statement.bind_string("name", "second.jpg")?;
    let mut values = ParameterValues::default();
    values.insert("s".to_owned(), NamedNode::new("urn:photo:2")?.into());
    batch.add_update("INSERT DATA { ~s a nfo:Image }", values)?;
    assert!(batch.add_update("INSERT DATA {", ParameterValues::default()).is_err());
    assert_eq!(batch.len(), 2);
    batch.execute()?;

    assert_eq!(
        rows(&connection, "SELECT ?n WHERE { <urn:photo:1> nfo:fileName ?n }")?,
        [vec!["\"first.jpg\"".to_owned()]]
    );
    assert!(ask(&connection, "ASK { <urn:photo:2> a nfo:Image }")?);
    Ok(())
}

#[test]
fn read_only_connections_reject_batches() -> Result<(), Box<dyn Error>> {
    let connection = Connection::open(
        ConnectionOptions::default().with_read_only(true),
        StoreLocation::Memory,
        None,
    )?;
    let mut batch = connection.create_batch();
    batch.add_sparql("INSERT DATA { <urn:a> a nfo:Document }");
    assert!(matches!(batch.execute(), Err(SparqlError::ReadOnly)));
    Ok(())
}

#[test]
fn persistent_stores_survive_reopening() -> Result<(), Box<dyn Error>> {
    let directory = tempfile::tempdir()?;
    let location = StoreLocation::from(directory.path());
    {
        let connection =
            Connection::open(ConnectionOptions::default(), location.clone(), None)?;
        connection.update(PHOTOS)?;
        connection.update("DELETE DATA { <urn:photo:3> nfo:width 32 }")?;
        connection.update("INSERT DATA { GRAPH <urn:g> { <urn:a> a nfo:Document } }")?;
        connection.close();
    }

    let connection = Connection::open(ConnectionOptions::default(), location, None)?;
    assert_eq!(
        rows(&connection, "SELECT ?u WHERE { ?u nfo:width ?w }")?,
        [vec!["<urn:photo:1>".to_owned()], vec!["<urn:photo:2>".to_owned()]]
    );
    assert!(ask(&connection, "ASK { GRAPH <urn:g> { <urn:a> a nfo:Document } }")?);
    Ok(())
}

#[test]
fn ontologies_are_loaded_into_fresh_stores() -> Result<(), Box<dyn Error>> {
    let directory = tempfile::tempdir()?;
    let ontology = directory.path().join("photos.ontology");
    fs::write(
        &ontology,
        r#"
        @prefix nrl: <http://tracker.api.gnome.org/ontology/v3/nrl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://example.com/photos#> a nrl:Namespace ; nrl:prefix "photo" .
        <http://example.com/photos#Album> a rdfs:Class .
        "#,
    )?;

    let connection = Connection::open(
        ConnectionOptions::default(),
        StoreLocation::Memory,
        Some(&ontology),
    )?;
    assert_eq!(
        connection.namespaces().lookup_prefix("photo"),
        Some("http://example.com/photos#")
    );
    connection.update("INSERT DATA { <urn:album> a photo:Album }")?;
    assert!(ask(&connection, "ASK { ?album a ?class . ?class a rdfs:Class }")?);
    Ok(())
}

#[test]
fn writers_time_out_while_another_transaction_runs() -> Result<(), Box<dyn Error>> {
    let connection = Connection::open(
        ConnectionOptions::default().with_write_timeout(Some(Duration::from_millis(50))),
        StoreLocation::Memory,
        None,
    )?;
    let notifier = connection.create_notifier()?;
    let (started, wait_started) = mpsc::channel();
    let started = Mutex::new(started);
    // The write slot stays held while callbacks run
    notifier.subscribe(move |_, _, _| {
        started.lock().unwrap().send(()).unwrap();
        thread::sleep(Duration::from_millis(500));
    })?;

    thread::scope(|scope| -> Result<(), Box<dyn Error>> {
        let writer = scope.spawn(|| connection.update("INSERT DATA { <urn:a> a nfo:Document }"));
        wait_started.recv()?;
        assert!(matches!(
            connection.update("INSERT DATA { <urn:b> a nfo:Document }"),
            Err(SparqlError::TransactionTimeout(_))
        ));
        // Readers do not wait for the writer
        assert!(ask(&connection, "ASK { <urn:a> a nfo:Document }")?);
        assert!(writer.join().unwrap().is_ok());
        Ok(())
    })?;
    Ok(())
}

#[test]
fn cancelled_queries_stop() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let cancellable = Cancellable::new();
    let mut cursor = connection.query_with("SELECT ?u WHERE { ?u a nfo:Image }", &cancellable)?;
    assert!(cursor.next()?);
    cancellable.cancel();
    assert!(matches!(cursor.next(), Err(SparqlError::Cancelled)));
    assert!(cursor.is_closed());
    Ok(())
}

#[tokio::test]
async fn async_operations_run_off_the_runtime() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    let outcome = connection.update_async(PHOTOS).await?;
    assert_eq!(outcome.inserted, 9);

    let mut batch = connection.create_batch();
    batch.add_sparql("INSERT DATA { <urn:a> a nfo:Document }");
    assert_eq!(batch.execute_async().await?.inserted, 1);

    let mut cursor = connection
        .query_async("SELECT ?u WHERE { ?u a nfo:Image } ORDER BY ?u", None)
        .await?;
    let mut photos = Vec::new();
    while cursor.next_async(None).await? {
        photos.push(cursor.get_iri(0)?.to_owned());
    }
    assert_eq!(photos, ["urn:photo:1", "urn:photo:2", "urn:photo:3"]);
    Ok(())
}

#[tokio::test]
async fn async_cursors_close_on_cancellation() -> Result<(), Box<dyn Error>> {
    let connection = connection()?;
    connection.update(PHOTOS)?;
    let cancellable = Cancellable::new();
    let mut cursor = connection
        .query_async("SELECT ?u WHERE { ?u a nfo:Image }", Some(cancellable.clone()))
        .await?;
    assert!(cursor.next_async(Some(&cancellable)).await?);
    cancellable.cancel();
    assert!(matches!(
        cursor.next_async(Some(&cancellable)).await,
        Err(SparqlError::Cancelled)
    ));
    assert!(cursor.is_closed());

    assert!(matches!(
        connection
            .query_async("ASK { ?s ?p ?o }", Some(cancellable))
            .await,
        Err(SparqlError::Cancelled)
    ));
    Ok(())
}

proptest! {
    #[test]
    fn executions_only_see_the_current_bindings(choices in prop::collection::vec(0_usize..3, 1..8)) {
        let names = ["photo.jpg", "other.jpg", "third.jpg"];
        let connection = Connection::in_memory().unwrap();
        connection.update(PHOTOS).unwrap();
        let mut statement = connection
            .query_statement("SELECT ?u WHERE { ?u nfo:fileName ~name }")
            .unwrap();
        for choice in choices {
            statement.bind_string("name", names[choice]).unwrap();
            let mut cursor = statement.execute().unwrap();
            let mut found = Vec::new();
            while cursor.next().unwrap() {
                found.push(cursor.get_iri(0).unwrap().to_owned());
            }
            prop_assert_eq!(found, vec![format!("urn:photo:{}", choice + 1)]);
        }
    }
}
