//! Ontology documents loaded when a store is created.

use crate::error::{OpenError, SparqlError};
use crate::io::{insert_document, RdfFormat};
use crate::notifier::NotifierRegistry;
use crate::transaction::TransactionManager;
use sparqlite_engine::BlankNodeAllocator;
use sparqlite_model::vocab::nrl;
use sparqlite_model::{GraphName, NamespaceManager, Subject, Term};
use sparqlite_storage::MemoryStorageReader;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ONTOLOGY_EXTENSIONS: [&str; 2] = ["ttl", "ontology"];

/// The ontology documents at `path`: the file itself or the Turtle files of the directory, in
/// name order.
pub(crate) fn ontology_documents(path: &Path) -> io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut documents = Vec::new();
    for entry in fs::read_dir(path)? {
        let document = entry?.path();
        let is_ontology = document
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| ONTOLOGY_EXTENSIONS.contains(&extension));
        if is_ontology && document.is_file() {
            documents.push(document);
        }
    }
    documents.sort();
    Ok(documents)
}

/// Loads the ontology at `path` into the default graph in a single transaction.
pub(crate) fn load_ontology(
    transactions: &TransactionManager,
    path: &Path,
    anonymous_blank_nodes: bool,
) -> Result<usize, OpenError> {
    let documents = ontology_documents(path).map_err(|error| OpenError::Ontology {
        path: path.display().to_string(),
        source: Box::new(error.into()),
    })?;
    let mut transaction = transactions.begin().map_err(|error| OpenError::Ontology {
        path: path.display().to_string(),
        source: Box::new(error),
    })?;
    let mut count = 0;
    for document in &documents {
        let loaded = File::open(document)
            .map_err(SparqlError::from)
            .and_then(|file| {
                insert_document(
                    transaction.writer(),
                    RdfFormat::Turtle,
                    BufReader::new(file),
                    &GraphName::DefaultGraph,
                    &mut BlankNodeAllocator::new(anonymous_blank_nodes),
                )
            });
        count += loaded.map_err(|error| OpenError::Ontology {
            path: document.display().to_string(),
            source: Box::new(error),
        })?;
        debug!(document = %document.display(), "Loaded ontology document");
    }
    transaction
        .commit(&NotifierRegistry::default())
        .map_err(|error| OpenError::Ontology {
            path: path.display().to_string(),
            source: Box::new(error),
        })?;
    info!(
        path = %path.display(),
        documents = documents.len(),
        quads = count,
        "Loaded ontology"
    );
    Ok(count)
}

/// Registers the prefixes declared with `nrl:prefix` in the store.
pub(crate) fn register_prefixes(reader: &MemoryStorageReader, namespaces: &mut NamespaceManager) {
    let predicate = nrl::PREFIX.into_owned();
    for quad in reader.quads_for_pattern(None, Some(&predicate), None, None) {
        if let (Subject::NamedNode(namespace), Term::Literal(prefix)) = (&quad.subject, &quad.object)
        {
            namespaces.add_prefix(prefix.value(), namespace.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_storage::MemoryStorage;

    const ONTOLOGY: &str = r#"
        @prefix nrl: <http://tracker.api.gnome.org/ontology/v3/nrl#> .
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <http://example.com/photos#> a nrl:Namespace ; nrl:prefix "photo" .
        <http://example.com/photos#Photo> a rdfs:Class .
    "#;

    #[test]
    fn directories_are_loaded_in_name_order() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("20-photos.ontology"), ONTOLOGY).unwrap();
        fs::write(
            directory.path().join("10-base.ttl"),
            "<urn:a> <urn:p> <urn:b> .",
        )
        .unwrap();
        fs::write(directory.path().join("README.md"), "not an ontology").unwrap();

        let documents = ontology_documents(directory.path()).unwrap();
        assert_eq!(
            documents
                .iter()
                .map(|document| document.file_name().unwrap().to_str().unwrap())
                .collect::<Vec<_>>(),
            ["10-base.ttl", "20-photos.ontology"]
        );

        let transactions = TransactionManager::new(MemoryStorage::new(), None);
        assert_eq!(load_ontology(&transactions, directory.path(), false).unwrap(), 4);

        let mut namespaces = NamespaceManager::empty();
        register_prefixes(&transactions.snapshot(), &mut namespaces);
        assert_eq!(
            namespaces.lookup_prefix("photo"),
            Some("http://example.com/photos#")
        );
    }

    #[test]
    fn invalid_documents_leave_the_store_empty() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("broken.ttl");
        fs::write(&path, "<urn:a> <urn:p> <urn:b> .\n<urn:a> <urn:p> .").unwrap();

        let transactions = TransactionManager::new(MemoryStorage::new(), None);
        let error = load_ontology(&transactions, &path, false).unwrap_err();
        assert!(matches!(
            SparqlError::from(error).root_cause(),
            SparqlError::RdfParse { line: Some(2), .. }
        ));
        assert!(transactions.snapshot().is_empty());
    }
}
