//! Vocabularies used by the engine.
//!
//! The standard W3C vocabularies are re-exported from oxrdf; the Nepomuk-style ontologies are the
//! ones the default [`NamespaceManager`](crate::NamespaceManager) knows about.

pub use oxrdf::vocab::{rdf, rdfs, xsd};

pub mod nrl {
    //! The Nepomuk Representational Language.
    use oxrdf::NamedNodeRef;

    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nrl#";

    /// Declares the preferred prefix of a namespace.
    pub const PREFIX: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://tracker.api.gnome.org/ontology/v3/nrl#prefix");
    /// The class of namespaces.
    pub const NAMESPACE_CLASS: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://tracker.api.gnome.org/ontology/v3/nrl#Namespace");
}

pub mod nie {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nie#";
}

pub mod nfo {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nfo#";
}

pub mod nco {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nco#";
}

pub mod nmm {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nmm#";
}

pub mod nao {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/nao#";
}

pub mod tracker {
    pub const NAMESPACE: &str = "http://tracker.api.gnome.org/ontology/v3/tracker#";
}

pub mod dc {
    pub const NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
}

/// Prefix of the IRIs generated for skolemized blank nodes.
pub const BLANK_NODE_IRI_PREFIX: &str = "urn:bnode:";
