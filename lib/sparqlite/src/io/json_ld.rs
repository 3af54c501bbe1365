//! A JSON-LD reader for self-contained documents.

use crate::error::SparqlError;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use sparqlite_model::vocab::{rdf, xsd};
use sparqlite_model::{
    BlankNode, GraphName, Literal, NamedNode, NamedOrBlankNode, Quad, Subject, Term,
};
use std::io::Read;

#[derive(Debug, Clone)]
enum Coercion {
    Id,
    Datatype(NamedNode),
}

#[derive(Debug, Clone)]
struct TermDefinition {
    iri: String,
    coercion: Option<Coercion>,
    language: Option<String>,
}

impl TermDefinition {
    fn plain(iri: String) -> Self {
        Self {
            iri,
            coercion: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Context {
    terms: FxHashMap<String, TermDefinition>,
    vocab: Option<String>,
    language: Option<String>,
}

/// Parses a JSON-LD document into quads. Node objects outside of a named `@graph` go to
/// `default_graph`.
pub(super) fn parse(reader: impl Read, default_graph: &GraphName) -> Result<Vec<Quad>, SparqlError> {
    let document: Value = serde_json::from_reader(reader).map_err(|error| {
        SparqlError::RdfParse {
            line: u64::try_from(error.line()).ok().filter(|line| *line > 0),
            column: u64::try_from(error.column()).ok().filter(|column| *column > 0),
            message: error.to_string(),
        }
    })?;
    let mut quads = Vec::new();
    let context = Context::default();
    match &document {
        Value::Array(nodes) => {
            for node in nodes {
                top_level_node(node, &context, default_graph, &mut quads)?;
            }
        }
        node => top_level_node(node, &context, default_graph, &mut quads)?,
    }
    Ok(quads)
}

fn top_level_node(
    node: &Value,
    context: &Context,
    graph: &GraphName,
    quads: &mut Vec<Quad>,
) -> Result<(), SparqlError> {
    let Value::Object(object) = node else {
        return Err(invalid("top-level values must be node objects"));
    };
    let context = context.with(object.get("@context"))?;
    let Some(nodes) = object.get("@graph") else {
        node_object(object, &context, graph, quads)?;
        return Ok(());
    };
    // A @graph with an @id is a named graph, otherwise its nodes belong to the current graph
    let graph = match object.get("@id") {
        Some(Value::String(id)) => match resource(id, &context, false)? {
            NamedOrBlankNode::NamedNode(node) => GraphName::NamedNode(node),
            NamedOrBlankNode::BlankNode(node) => GraphName::BlankNode(node),
        },
        Some(_) => return Err(invalid("@id must be a string")),
        None => graph.clone(),
    };
    for node in as_array(nodes) {
        let Value::Object(node) = node else {
            return Err(invalid("@graph entries must be node objects"));
        };
        let context = context.with(node.get("@context"))?;
        node_object(node, &context, &graph, quads)?;
    }
    Ok(())
}

/// Emits the quads of a node object and returns its subject.
fn node_object(
    object: &Map<String, Value>,
    context: &Context,
    graph: &GraphName,
    quads: &mut Vec<Quad>,
) -> Result<NamedOrBlankNode, SparqlError> {
    let subject = match object.get("@id") {
        Some(Value::String(id)) => resource(id, context, false)?,
        Some(_) => return Err(invalid("@id must be a string")),
        None => BlankNode::default().into(),
    };
    let subject_term = Subject::from(subject.clone());

    for (key, value) in object {
        match key.as_str() {
            "@context" | "@id" => {}
            "@type" => {
                for class in as_array(value) {
                    let Value::String(class) = class else {
                        return Err(invalid("@type values must be strings"));
                    };
                    quads.push(Quad::new(
                        subject_term.clone(),
                        rdf::TYPE,
                        Term::from(resource(class, context, true)?),
                        graph.clone(),
                    ));
                }
            }
            "@graph" => return Err(invalid("nested @graph is not supported")),
            key if key.starts_with('@') => {
                return Err(invalid(format!("the keyword {key} is not supported")))
            }
            key => {
                let definition = context.terms.get(key);
                let predicate = match resource(key, context, true)? {
                    NamedOrBlankNode::NamedNode(node) => node,
                    NamedOrBlankNode::BlankNode(_) => {
                        return Err(invalid(format!("the property {key} is a blank node")))
                    }
                };
                for value in as_array(value) {
                    if let Some(object) = property_value(value, definition, context, graph, quads)? {
                        quads.push(Quad::new(
                            subject_term.clone(),
                            predicate.clone(),
                            object,
                            graph.clone(),
                        ));
                    }
                }
            }
        }
    }
    Ok(subject)
}

fn property_value(
    value: &Value,
    definition: Option<&TermDefinition>,
    context: &Context,
    graph: &GraphName,
    quads: &mut Vec<Quad>,
) -> Result<Option<Term>, SparqlError> {
    let coercion = definition.and_then(|definition| definition.coercion.as_ref());
    Ok(Some(match value {
        Value::Null => return Ok(None),
        Value::String(value) => match coercion {
            Some(Coercion::Id) => resource(value, context, false)?.into(),
            Some(Coercion::Datatype(datatype)) => {
                Literal::new_typed_literal(value, datatype.clone()).into()
            }
            None => {
                let language = definition
                    .and_then(|definition| definition.language.as_deref())
                    .or(context.language.as_deref());
                string_literal(value, language)?.into()
            }
        },
        Value::Bool(value) => Literal::from(*value).into(),
        Value::Number(number) => {
            let datatype = match coercion {
                Some(Coercion::Datatype(datatype)) => datatype.as_ref(),
                _ if number.is_i64() || number.is_u64() => xsd::INTEGER,
                _ => xsd::DOUBLE,
            };
            Literal::new_typed_literal(number.to_string(), datatype).into()
        }
        Value::Array(_) => return Err(invalid("nested arrays are not supported")),
        Value::Object(object) => {
            if object.contains_key("@list") || object.contains_key("@set") {
                return Err(invalid("@list and @set are not supported"));
            }
            if let Some(value) = object.get("@value") {
                value_object(value, object, context)?
            } else {
                node_object(object, &context.with(object.get("@context"))?, graph, quads)?
                    .into()
            }
        }
    }))
}

fn value_object(
    value: &Value,
    object: &Map<String, Value>,
    context: &Context,
) -> Result<Term, SparqlError> {
    let lexical = match value {
        Value::String(value) => value.clone(),
        Value::Bool(value) => value.to_string(),
        Value::Number(value) => value.to_string(),
        _ => return Err(invalid("@value must be a string, a number or a boolean")),
    };
    match (object.get("@type"), object.get("@language")) {
        (Some(_), Some(_)) => Err(invalid("a value cannot have both @type and @language")),
        (Some(Value::String(datatype)), None) => match resource(datatype, context, true)? {
            NamedOrBlankNode::NamedNode(datatype) => {
                Ok(Literal::new_typed_literal(lexical, datatype).into())
            }
            NamedOrBlankNode::BlankNode(_) => Err(invalid("a datatype cannot be a blank node")),
        },
        (None, Some(Value::String(language))) => Ok(string_literal(&lexical, Some(language))?.into()),
        (None, None) => Ok(match value {
            Value::Bool(value) => Literal::from(*value),
            Value::Number(number) if number.is_i64() || number.is_u64() => {
                Literal::new_typed_literal(lexical, xsd::INTEGER)
            }
            Value::Number(_) => Literal::new_typed_literal(lexical, xsd::DOUBLE),
            _ => Literal::new_simple_literal(lexical),
        }
        .into()),
        _ => Err(invalid("@type and @language must be strings")),
    }
}

fn string_literal(value: &str, language: Option<&str>) -> Result<Literal, SparqlError> {
    match language {
        Some(language) => Literal::new_language_tagged_literal(value, language)
            .map_err(|error| invalid(error.to_string())),
        None => Ok(Literal::new_simple_literal(value)),
    }
}

impl Context {
    /// The context extended by a local `@context` value.
    fn with(&self, local: Option<&Value>) -> Result<Self, SparqlError> {
        let Some(local) = local else {
            return Ok(self.clone());
        };
        let mut context = self.clone();
        for local in as_array(local) {
            match local {
                Value::Null => context = Self::default(),
                Value::Object(definitions) => context.define(definitions)?,
                Value::String(_) => return Err(invalid("remote contexts are not supported")),
                _ => return Err(invalid("@context must be an object")),
            }
        }
        Ok(context)
    }

    fn define(&mut self, definitions: &Map<String, Value>) -> Result<(), SparqlError> {
        if let Some(vocab) = definitions.get("@vocab") {
            self.vocab = vocab.as_str().map(str::to_owned);
        }
        if let Some(language) = definitions.get("@language") {
            self.language = language.as_str().map(str::to_owned);
        }
        // Plain definitions are registered before being expanded, they may use each other
        let plain = definitions
            .iter()
            .filter(|(term, _)| !term.starts_with('@'))
            .filter_map(|(term, definition)| Some((term, definition.as_str()?)))
            .collect::<Vec<_>>();
        for (term, iri) in &plain {
            self.terms.insert((*term).clone(), TermDefinition::plain((*iri).to_owned()));
        }
        for (term, iri) in plain {
            let iri = self.expand(iri, false);
            self.terms.insert(term.clone(), TermDefinition::plain(iri));
        }
        for (term, definition) in definitions {
            let Value::Object(definition) = definition else {
                continue;
            };
            let iri = match definition.get("@id") {
                Some(Value::String(iri)) => self.expand(iri, true),
                Some(_) => return Err(invalid(format!("the @id of {term} must be a string"))),
                None => self.expand(term, true),
            };
            let coercion = match definition.get("@type") {
                Some(Value::String(kind)) if kind == "@id" || kind == "@vocab" => {
                    Some(Coercion::Id)
                }
                Some(Value::String(datatype)) => Some(Coercion::Datatype(
                    NamedNode::new(self.expand(datatype, true))
                        .map_err(|error| invalid(error.to_string()))?,
                )),
                Some(_) => return Err(invalid(format!("the @type of {term} must be a string"))),
                None => None,
            };
            let language = definition
                .get("@language")
                .and_then(Value::as_str)
                .map(str::to_owned);
            self.terms.insert(
                term.clone(),
                TermDefinition {
                    iri,
                    coercion,
                    language,
                },
            );
        }
        Ok(())
    }

    /// Expands a term, a compact IRI or, if `vocab` is set, a vocabulary-relative name.
    fn expand(&self, value: &str, vocab: bool) -> String {
        if let Some(definition) = self.terms.get(value) {
            return definition.iri.clone();
        }
        if let Some((prefix, suffix)) = value.split_once(':') {
            if !suffix.starts_with("//") {
                if let Some(definition) = self.terms.get(prefix) {
                    return format!("{}{suffix}", definition.iri);
                }
            }
            return value.to_owned();
        }
        match &self.vocab {
            Some(base) if vocab => format!("{base}{value}"),
            _ => value.to_owned(),
        }
    }
}

fn resource(value: &str, context: &Context, vocab: bool) -> Result<NamedOrBlankNode, SparqlError> {
    if let Some(label) = value.strip_prefix("_:") {
        return BlankNode::new(label)
            .map(Into::into)
            .map_err(|error| invalid(error.to_string()));
    }
    let iri = context.expand(value, vocab);
    NamedNode::new(iri.as_str())
        .map(Into::into)
        .map_err(|error| invalid(format!("invalid IRI '{iri}': {error}")))
}

fn as_array(value: &Value) -> &[Value] {
    match value {
        Value::Array(values) => values,
        value => std::slice::from_ref(value),
    }
}

fn invalid(message: impl Into<String>) -> SparqlError {
    SparqlError::RdfParse {
        line: None,
        column: None,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(document: &str) -> Result<Vec<Quad>, SparqlError> {
        parse(document.as_bytes(), &GraphName::DefaultGraph)
    }

    fn contains(quads: &[Quad], subject: &str, predicate: &str, object: Term) -> bool {
        quads.iter().any(|quad| {
            quad.subject.to_string() == subject
                && quad.predicate.as_str() == predicate
                && quad.object == object
        })
    }

    #[test]
    fn contexts_expand_terms_and_prefixes() {
        let quads = parse_str(
            r#"{
                "@context": {
                    "nfo": "http://tracker.api.gnome.org/ontology/v3/nfo#",
                    "name": "nfo:fileName",
                    "size": {"@id": "nfo:fileSize", "@type": "http://www.w3.org/2001/XMLSchema#integer"},
                    "folder": {"@id": "nfo:belongsToContainer", "@type": "@id"}
                },
                "@id": "urn:file",
                "@type": "nfo:FileDataObject",
                "name": "a.png",
                "size": "42",
                "folder": "urn:folder"
            }"#,
        )
        .unwrap();
        assert_eq!(quads.len(), 4);
        let nfo = "http://tracker.api.gnome.org/ontology/v3/nfo#";
        assert!(contains(
            &quads,
            "<urn:file>",
            rdf::TYPE.as_str(),
            NamedNode::new_unchecked(format!("{nfo}FileDataObject")).into()
        ));
        assert!(contains(
            &quads,
            "<urn:file>",
            &format!("{nfo}fileName"),
            Literal::from("a.png").into()
        ));
        assert!(contains(
            &quads,
            "<urn:file>",
            &format!("{nfo}fileSize"),
            Literal::new_typed_literal("42", xsd::INTEGER).into()
        ));
        assert!(contains(
            &quads,
            "<urn:file>",
            &format!("{nfo}belongsToContainer"),
            NamedNode::new_unchecked("urn:folder").into()
        ));
    }

    #[test]
    fn values_and_nested_nodes() {
        let quads = parse_str(
            r#"{
                "@context": {"@vocab": "urn:vocab:"},
                "@id": "urn:a",
                "title": {"@value": "chat", "@language": "fr"},
                "count": 3,
                "ratio": 0.5,
                "done": true,
                "author": {"@id": "_:b", "name": "Ann"}
            }"#,
        )
        .unwrap();
        assert_eq!(quads.len(), 6);
        assert!(contains(
            &quads,
            "<urn:a>",
            "urn:vocab:title",
            Literal::new_language_tagged_literal_unchecked("chat", "fr").into()
        ));
        assert!(contains(&quads, "<urn:a>", "urn:vocab:count", Literal::from(3).into()));
        assert!(contains(&quads, "<urn:a>", "urn:vocab:done", Literal::from(true).into()));
        assert!(contains(
            &quads,
            "<urn:a>",
            "urn:vocab:author",
            BlankNode::new_unchecked("b").into()
        ));
        assert!(contains(&quads, "_:b", "urn:vocab:name", Literal::from("Ann").into()));
    }

    #[test]
    fn named_graphs() {
        let quads = parse_str(
            r#"{
                "@id": "urn:g",
                "@graph": [{"@id": "urn:a", "urn:p": {"@id": "urn:b"}}]
            }"#,
        )
        .unwrap();
        assert_eq!(quads.len(), 1);
        assert_eq!(
            quads[0].graph_name,
            GraphName::from(NamedNode::new_unchecked("urn:g"))
        );
    }

    #[test]
    fn invalid_documents_are_rejected() {
        assert!(matches!(
            parse_str("{\"@id\": \"urn:a\",\n \"urn:p\": }"),
            Err(SparqlError::RdfParse { line: Some(2), .. })
        ));
        assert!(parse_str(r#"{"@context": "http://schema.org/"}"#).is_err());
        assert!(parse_str(r#"{"@id": "urn:a", "urn:p": {"@list": [1, 2]}}"#).is_err());
        assert!(parse_str(r#"{"@id": "urn:a", "relative": "x"}"#).is_err());
    }
}
