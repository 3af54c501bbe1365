#![cfg(test)]

use sparqlite_engine::{
    Cancellable, EvaluationOptions, ParameterValues, QueryEvaluationError, StatementCompiler,
    UpdateOutcome,
};
use sparqlite_model::vocab::BLANK_NODE_IRI_PREFIX;
use sparqlite_model::{Literal, NamedOrBlankNode, Term};
use sparqlite_storage::MemoryStorage;
use std::fs;

const DATA: &str = r#"
INSERT DATA {
    <urn:a> <urn:name> "A" ; <urn:age> 30 .
    <urn:b> <urn:name> "B" .
    <urn:c> <urn:age> 12 .
}
"#;

struct Fixture {
    storage: MemoryStorage,
    compiler: StatementCompiler,
    options: EvaluationOptions,
}

impl Fixture {
    fn new() -> Self {
        Self::with_options(EvaluationOptions::default())
    }

    fn with_options(options: EvaluationOptions) -> Self {
        Self {
            storage: MemoryStorage::new(),
            compiler: StatementCompiler::default(),
            options,
        }
    }

    fn with_data() -> Self {
        let fixture = Self::new();
        fixture.update(DATA).unwrap();
        fixture
    }

    fn update(&self, text: &str) -> Result<UpdateOutcome, QueryEvaluationError> {
        self.update_with(text, &ParameterValues::default())
    }

    fn update_with(
        &self,
        text: &str,
        values: &ParameterValues,
    ) -> Result<UpdateOutcome, QueryEvaluationError> {
        let update = self.compiler.compile_update(text)?;
        let mut writer = self.storage.begin();
        let outcome = update.execute(&mut writer, values, &self.options, None)?;
        writer.commit()?;
        Ok(outcome)
    }

    fn select(&self, text: &str) -> Vec<Vec<Option<String>>> {
        let query = self.compiler.compile_query(text).unwrap();
        query
            .execute(
                self.storage.snapshot(),
                &ParameterValues::default(),
                &self.options,
                None,
            )
            .unwrap()
            .map(|row| row.unwrap().iter().map(|t| t.as_ref().map(cell)).collect())
            .collect()
    }
}

fn cell(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_owned(),
        Term::BlankNode(node) => format!("_:{}", node.as_str()),
        Term::Literal(literal) => literal.value().to_owned(),
    }
}

fn row(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some((*v).to_owned())).collect()
}

#[test]
fn optional_union_and_minus() {
    let fixture = Fixture::with_data();
    assert_eq!(
        fixture.select(
            "SELECT ?s ?age WHERE { ?s <urn:name> ?n OPTIONAL { ?s <urn:age> ?age } } ORDER BY ?s"
        ),
        [
            row(&["urn:a", "30"]),
            vec![Some("urn:b".to_owned()), None]
        ]
    );
    assert_eq!(
        fixture.select(
            "SELECT ?s WHERE { { ?s <urn:name> \"A\" } UNION { ?s <urn:age> 12 } } ORDER BY ?s"
        ),
        [row(&["urn:a"]), row(&["urn:c"])]
    );
    assert_eq!(
        fixture.select("SELECT ?s WHERE { ?s <urn:name> ?n MINUS { ?s <urn:age> ?a } }"),
        [row(&["urn:b"])]
    );
}

#[test]
fn filters_bindings_and_values() {
    let fixture = Fixture::with_data();
    assert_eq!(
        fixture.select(
            "SELECT ?s ?next WHERE { ?s <urn:age> ?age FILTER(?age > 20) BIND(?age + 1 AS ?next) }"
        ),
        [row(&["urn:a", "31"])]
    );
    assert_eq!(
        fixture.select(
            "SELECT ?s WHERE { VALUES ?s { <urn:a> <urn:c> } FILTER EXISTS { ?s <urn:name> ?n } }"
        ),
        [row(&["urn:a"])]
    );
    assert_eq!(
        fixture.select(
            "SELECT (STRLEN(?n) AS ?len) (LCASE(?n) AS ?lower) WHERE { <urn:a> <urn:name> ?n }"
        ),
        [row(&["1", "a"])]
    );
    assert_eq!(
        fixture.select(
            "SELECT ?s WHERE { ?s <urn:name> ?n FILTER(REGEX(?n, \"^b$\", \"i\")) }"
        ),
        [row(&["urn:b"])]
    );
}

#[test]
fn bindings_of_a_nested_group_must_agree_with_the_outer_ones() {
    let fixture = Fixture::new();
    fixture
        .update("INSERT DATA { <urn:a> <urn:p> <urn:b> }")
        .unwrap();
    assert!(fixture
        .select("SELECT ?x WHERE { <urn:a> <urn:p> ?x . { BIND(<urn:zzz> AS ?x) } }")
        .is_empty());
    assert_eq!(
        fixture.select("SELECT ?x WHERE { <urn:a> <urn:p> ?x . { BIND(<urn:b> AS ?x) } }"),
        [row(&["urn:b"])]
    );
}

#[test]
fn keyword_named_variables() {
    let fixture = Fixture::with_data();
    assert_eq!(
        fixture.select("SELECT ?insert { ?insert <urn:name> \"B\" }"),
        [row(&["urn:b"])]
    );
    assert_eq!(
        fixture.select("SELECT ?delete WHERE { <urn:c> ?delete 12 }"),
        [row(&["urn:age"])]
    );
}

#[test]
fn casts_from_strings() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.select(
            "PREFIX xsd: <http://www.w3.org/2001/XMLSchema#> \
             SELECT (xsd:integer(\" 42 \") AS ?i) (xsd:double(\"2.5\") AS ?d) \
             (xsd:integer(\"x\") AS ?bad) WHERE {}"
        ),
        [vec![Some("42".to_owned()), Some("2.5".to_owned()), None]]
    );
}

#[test]
fn aggregates() {
    let fixture = Fixture::with_data();
    assert_eq!(
        fixture.select("SELECT ?s (COUNT(*) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?s ORDER BY ?s"),
        [
            row(&["urn:a", "2"]),
            row(&["urn:b", "1"]),
            row(&["urn:c", "1"])
        ]
    );
    assert_eq!(
        fixture.select(
            "SELECT (SUM(?age) AS ?sum) (MAX(?age) AS ?max) (MIN(?age) AS ?min) WHERE { ?s <urn:age> ?age }"
        ),
        [row(&["42", "30", "12"])]
    );
    assert_eq!(
        fixture.select("SELECT (COUNT(*) AS ?c) WHERE { ?s <urn:missing> ?o }"),
        [row(&["0"])]
    );
}

#[test]
fn sub_select_with_modifiers() {
    let fixture = Fixture::with_data();
    assert_eq!(
        fixture.select(
            "SELECT ?s WHERE { { SELECT DISTINCT ?s WHERE { ?s ?p ?o } ORDER BY ?s LIMIT 2 OFFSET 1 } }"
        ),
        [row(&["urn:b"]), row(&["urn:c"])]
    );
}

#[test]
fn graphs_and_datasets() {
    let fixture = Fixture::new();
    fixture
        .update(
            "INSERT DATA { GRAPH <urn:g1> { <urn:x> <urn:p> \"1\" } GRAPH <urn:g2> { <urn:y> <urn:p> \"2\" } }",
        )
        .unwrap();
    assert_eq!(
        fixture.select("SELECT ?g ?s WHERE { GRAPH ?g { ?s <urn:p> ?o } } ORDER BY ?g"),
        [row(&["urn:g1", "urn:x"]), row(&["urn:g2", "urn:y"])]
    );
    assert_eq!(
        fixture.select("SELECT ?s FROM <urn:g1> WHERE { ?s <urn:p> ?o }"),
        [row(&["urn:x"])]
    );
    assert_eq!(
        fixture.select("SELECT ?s WHERE { ?s <urn:p> ?o }").len(),
        2
    );

    let isolated = Fixture::with_options(EvaluationOptions {
        union_default_graph: false,
        ..EvaluationOptions::default()
    });
    isolated
        .update("INSERT DATA { GRAPH <urn:g1> { <urn:x> <urn:p> \"1\" } }")
        .unwrap();
    assert!(isolated
        .select("SELECT ?s WHERE { ?s <urn:p> ?o }")
        .is_empty());
}

#[test]
fn inserted_blank_nodes_are_skolemized() {
    let fixture = Fixture::new();
    let outcome = fixture
        .update("INSERT DATA { _:x a <urn:T> ; <urn:p> _:y }")
        .unwrap();
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.blank_nodes.len(), 1);
    let labels = &outcome.blank_nodes[0];
    let Some(NamedOrBlankNode::NamedNode(x)) = labels.get("x") else {
        panic!("expected a skolem IRI for _:x, got {labels:?}");
    };
    assert!(x.as_str().starts_with(BLANK_NODE_IRI_PREFIX));
    assert!(labels.contains_key("y"));
    assert_eq!(
        fixture.select("SELECT ?s WHERE { ?s a <urn:T> }"),
        [row(&[x.as_str()])]
    );
}

#[test]
fn anonymous_blank_nodes_stay_blank() {
    let fixture = Fixture::with_options(EvaluationOptions {
        anonymous_blank_nodes: true,
        ..EvaluationOptions::default()
    });
    let outcome = fixture.update("INSERT DATA { _:x a <urn:T> }").unwrap();
    assert!(matches!(
        outcome.blank_nodes[0].get("x"),
        Some(NamedOrBlankNode::BlankNode(_))
    ));
}

#[test]
fn delete_insert_where() {
    let fixture = Fixture::with_data();
    let outcome = fixture
        .update(
            "DELETE { ?s <urn:age> ?a } INSERT { ?s <urn:age> ?b } WHERE { ?s <urn:age> ?a BIND(?a + 1 AS ?b) }",
        )
        .unwrap();
    assert_eq!((outcome.removed, outcome.inserted), (2, 2));
    assert_eq!(
        fixture.select("SELECT ?s ?a WHERE { ?s <urn:age> ?a } ORDER BY ?s"),
        [row(&["urn:a", "31"]), row(&["urn:c", "13"])]
    );

    let outcome = fixture
        .update("INSERT { ?s <urn:tag> _:t } WHERE { ?s <urn:name> ?n }")
        .unwrap();
    assert_eq!(outcome.blank_nodes.len(), 2);
    assert_ne!(
        outcome.blank_nodes[0].get("t"),
        outcome.blank_nodes[1].get("t")
    );
}

#[test]
fn parameters_inside_data_blocks() {
    let fixture = Fixture::new();
    let mut values = ParameterValues::default();
    values.insert(
        "name".to_owned(),
        Literal::new_simple_literal("photo.jpg").into(),
    );
    fixture
        .update_with("INSERT DATA { <urn:f> <urn:name> ~name }", &values)
        .unwrap();
    assert_eq!(
        fixture.select("SELECT ?n WHERE { <urn:f> <urn:name> ?n }"),
        [row(&["photo.jpg"])]
    );
    assert!(matches!(
        fixture.update("DELETE DATA { <urn:f> <urn:name> ~name }"),
        Err(QueryEvaluationError::UnboundParameter(name)) if name == "name"
    ));
    fixture
        .update_with("DELETE DATA { <urn:f> <urn:name> ~name }", &values)
        .unwrap();
    assert!(fixture
        .select("SELECT ?n WHERE { <urn:f> <urn:name> ?n }")
        .is_empty());
}

#[test]
fn graph_management() {
    let fixture = Fixture::new();
    fixture.update("CREATE GRAPH <urn:g>").unwrap();
    assert!(matches!(
        fixture.update("CREATE GRAPH <urn:g>"),
        Err(QueryEvaluationError::GraphAlreadyExists(_))
    ));
    fixture.update("CREATE SILENT GRAPH <urn:g>").unwrap();

    fixture
        .update("INSERT DATA { GRAPH <urn:g> { <urn:s> <urn:p> <urn:o> } }")
        .unwrap();
    fixture.update("CLEAR GRAPH <urn:g>").unwrap();
    assert!(fixture.select("SELECT * WHERE { ?s ?p ?o }").is_empty());

    fixture.update("DROP GRAPH <urn:g>").unwrap();
    assert!(matches!(
        fixture.update("DROP GRAPH <urn:g>"),
        Err(QueryEvaluationError::GraphDoesNotExist(_))
    ));
    assert!(matches!(
        fixture.update("CLEAR GRAPH <urn:missing>"),
        Err(QueryEvaluationError::GraphDoesNotExist(_))
    ));
    fixture.update("DROP SILENT GRAPH <urn:missing>").unwrap();
}

#[test]
fn load_local_files() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("data.ttl");
    fs::write(&path, "<urn:l> <urn:p> \"v\" .\n").unwrap();

    let fixture = Fixture::new();
    fixture
        .update(&format!(
            "LOAD <file://{}> INTO GRAPH <urn:loaded>",
            path.display()
        ))
        .unwrap();
    assert_eq!(
        fixture.select("SELECT ?s WHERE { GRAPH <urn:loaded> { ?s <urn:p> \"v\" } }"),
        [row(&["urn:l"])]
    );

    let unknown = directory.path().join("data.unknown");
    fs::write(&unknown, "").unwrap();
    assert!(matches!(
        fixture.update(&format!("LOAD <file://{}>", unknown.display())),
        Err(QueryEvaluationError::UnsupportedContentType(_))
    ));
    fixture
        .update(&format!(
            "LOAD SILENT <file://{}>",
            directory.path().join("missing.ttl").display()
        ))
        .unwrap();
}

#[test]
fn cancelled_evaluations_stop() {
    let fixture = Fixture::with_data();
    let query = fixture
        .compiler
        .compile_query("SELECT * WHERE { ?s ?p ?o }")
        .unwrap();
    let cancellable = Cancellable::new();
    cancellable.cancel();
    let mut solutions = query
        .execute(
            fixture.storage.snapshot(),
            &ParameterValues::default(),
            &fixture.options,
            Some(cancellable),
        )
        .unwrap();
    assert!(matches!(
        solutions.next(),
        Some(Err(QueryEvaluationError::Cancelled))
    ));
}

#[test]
fn unsupported_features_fail_at_compile_time() {
    let compiler = StatementCompiler::default();
    assert!(matches!(
        compiler.compile_query("SELECT * WHERE { ?s <urn:p>* ?o }"),
        Err(QueryEvaluationError::NotImplemented(_))
    ));
    assert!(matches!(
        compiler.compile_query("SELECT (<urn:f>(?s) AS ?x) WHERE { ?s ?p ?o }"),
        Err(QueryEvaluationError::NotImplemented(_))
    ));
}
