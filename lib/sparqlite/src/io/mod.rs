//! RDF document ingestion.

mod json_ld;

use crate::error::SparqlError;
use oxrdfio::RdfParser;
use sparqlite_engine::BlankNodeAllocator;
use sparqlite_model::GraphName;
use sparqlite_storage::MemoryStorageWriter;
use std::fmt;
use std::io::Read;
use tracing::debug;

/// The RDF serialization formats accepted by [`Batch::add_rdf`](crate::Batch::add_rdf).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RdfFormat {
    Turtle,
    TriG,
    NTriples,
    NQuads,
    RdfXml,
    /// JSON-LD with inline contexts: `@context`, `@id`, `@type`, `@graph`, value objects and
    /// nested node objects. Remote contexts and lists are rejected.
    JsonLd,
}

impl RdfFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "ttl" | "turtle" | "ontology" => Some(Self::Turtle),
            "trig" => Some(Self::TriG),
            "nt" => Some(Self::NTriples),
            "nq" => Some(Self::NQuads),
            "rdf" | "xml" | "owl" => Some(Self::RdfXml),
            "jsonld" | "json" => Some(Self::JsonLd),
            _ => None,
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let media_type = media_type.split(';').next()?.trim();
        [
            Self::Turtle,
            Self::TriG,
            Self::NTriples,
            Self::NQuads,
            Self::RdfXml,
            Self::JsonLd,
        ]
        .into_iter()
        .find(|format| format.media_type().eq_ignore_ascii_case(media_type))
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Turtle => "text/turtle",
            Self::TriG => "application/trig",
            Self::NTriples => "application/n-triples",
            Self::NQuads => "application/n-quads",
            Self::RdfXml => "application/rdf+xml",
            Self::JsonLd => "application/ld+json",
        }
    }

    fn parser_format(self) -> Option<oxrdfio::RdfFormat> {
        match self {
            Self::Turtle => Some(oxrdfio::RdfFormat::Turtle),
            Self::TriG => Some(oxrdfio::RdfFormat::TriG),
            Self::NTriples => Some(oxrdfio::RdfFormat::NTriples),
            Self::NQuads => Some(oxrdfio::RdfFormat::NQuads),
            Self::RdfXml => Some(oxrdfio::RdfFormat::RdfXml),
            Self::JsonLd => None,
        }
    }
}

impl fmt::Display for RdfFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Turtle => "Turtle",
            Self::TriG => "TriG",
            Self::NTriples => "N-Triples",
            Self::NQuads => "N-Quads",
            Self::RdfXml => "RDF/XML",
            Self::JsonLd => "JSON-LD",
        })
    }
}

/// Parses a document and inserts its quads into `writer`.
///
/// Triples go to `graph`. Blank nodes are allocated through `allocator`. Quads are inserted
/// while the document is read, a syntax error leaves the already inserted ones in the writer.
/// Returns the number of parsed quads.
pub(crate) fn insert_document(
    writer: &mut MemoryStorageWriter,
    format: RdfFormat,
    reader: impl Read,
    graph: &GraphName,
    allocator: &mut BlankNodeAllocator,
) -> Result<usize, SparqlError> {
    let mut count = 0;
    if let Some(parser_format) = format.parser_format() {
        let parser = RdfParser::from_format(parser_format).with_default_graph(graph.clone());
        for quad in parser.for_reader(reader) {
            let quad = allocator.relabel_quad(quad?);
            writer.insert(quad.as_ref());
            count += 1;
        }
    } else {
        for quad in json_ld::parse(reader, graph)? {
            let quad = allocator.relabel_quad(quad);
            writer.insert(quad.as_ref());
            count += 1;
        }
    }
    if let GraphName::NamedNode(graph) = graph {
        writer.insert_named_graph(graph.as_ref().into());
    }
    debug!(%format, quads = count, "Inserted RDF document");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_model::NamedNode;
    use sparqlite_storage::MemoryStorage;

    #[test]
    fn formats_are_recognized() {
        assert_eq!(RdfFormat::from_extension("TTL"), Some(RdfFormat::Turtle));
        assert_eq!(RdfFormat::from_extension("jsonld"), Some(RdfFormat::JsonLd));
        assert_eq!(RdfFormat::from_extension("csv"), None);
        assert_eq!(
            RdfFormat::from_media_type("application/ld+json; charset=utf-8"),
            Some(RdfFormat::JsonLd)
        );
        assert_eq!(RdfFormat::from_media_type("text/plain"), None);
    }

    #[test]
    fn triples_go_to_the_requested_graph() {
        let storage = MemoryStorage::new();
        let mut writer = storage.begin();
        let graph = GraphName::from(NamedNode::new_unchecked("urn:g"));
        let count = insert_document(
            &mut writer,
            RdfFormat::Turtle,
            "<urn:a> <urn:p> _:x . _:x <urn:p> <urn:b> .".as_bytes(),
            &graph,
            &mut BlankNodeAllocator::new(false),
        )
        .unwrap();
        assert_eq!(count, 2);
        let reader = writer.reader();
        assert!(reader.contains_named_graph(NamedNode::new_unchecked("urn:g").as_ref().into()));
        let quads = reader
            .quads_for_pattern(None, None, None, Some(&graph))
            .collect::<Vec<_>>();
        assert_eq!(quads.len(), 2);
        // Both occurrences of _:x are the same skolem IRI
        assert!(quads.iter().any(|quad| quad.subject.to_string().starts_with("<urn:bnode:")));
    }

    #[test]
    fn syntax_errors_have_positions() {
        let storage = MemoryStorage::new();
        let mut writer = storage.begin();
        let error = insert_document(
            &mut writer,
            RdfFormat::Turtle,
            "<urn:a> <urn:p> <urn:b> .\n<urn:a> <urn:p> .".as_bytes(),
            &GraphName::DefaultGraph,
            &mut BlankNodeAllocator::new(false),
        )
        .unwrap_err();
        assert!(matches!(error, SparqlError::RdfParse { line: Some(2), .. }));
    }
}
