use crate::vocab::{dc, nao, nco, nfo, nie, nmm, nrl, rdf, rdfs, tracker, xsd};
use oxrdf::{IriParseError, NamedNode};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Maps prefixes to namespace IRIs.
///
/// The manager is consulted when compiling SPARQL (undeclared prefixes known to the manager are
/// added to the prologue) and when turning a [`Resource`](crate::Resource) into triples
/// (property names and URI values may be given as prefixed names).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceManager {
    prefixes: BTreeMap<String, String>,
}

impl Default for NamespaceManager {
    fn default() -> Self {
        let mut manager = Self::empty();
        manager.add_prefix("rdf", namespace_of(rdf::TYPE.as_str()));
        manager.add_prefix("rdfs", namespace_of(rdfs::LABEL.as_str()));
        manager.add_prefix("xsd", namespace_of(xsd::STRING.as_str()));
        manager.add_prefix("dc", dc::NAMESPACE);
        manager.add_prefix("nrl", nrl::NAMESPACE);
        manager.add_prefix("nie", nie::NAMESPACE);
        manager.add_prefix("nfo", nfo::NAMESPACE);
        manager.add_prefix("nco", nco::NAMESPACE);
        manager.add_prefix("nmm", nmm::NAMESPACE);
        manager.add_prefix("nao", nao::NAMESPACE);
        manager.add_prefix("tracker", tracker::NAMESPACE);
        manager
    }
}

impl NamespaceManager {
    /// Creates a manager without any prefix.
    pub fn empty() -> Self {
        Self {
            prefixes: BTreeMap::new(),
        }
    }

    /// Registers `prefix` for `namespace`, replacing a previous registration of the same prefix.
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    pub fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }

    /// Iterates over `(prefix, namespace)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes
            .iter()
            .map(|(prefix, namespace)| (prefix.as_str(), namespace.as_str()))
    }

    /// Expands a prefixed name such as `nfo:fileName`.
    ///
    /// Strings whose prefix is unknown (e.g. `urn:uuid:...` or `http://...`) are returned as is.
    pub fn expand<'a>(&self, compact: &'a str) -> Cow<'a, str> {
        if let Some((prefix, local)) = compact.split_once(':') {
            if !local.starts_with("//") {
                if let Some(namespace) = self.prefixes.get(prefix) {
                    return Cow::Owned(format!("{namespace}{local}"));
                }
            }
        }
        Cow::Borrowed(compact)
    }

    /// Expands `compact` and validates the result as an IRI.
    pub fn expand_named_node(&self, compact: &str) -> Result<NamedNode, IriParseError> {
        NamedNode::new(self.expand(compact).into_owned())
    }

    /// Compresses `iri` to a prefixed name, using the longest matching namespace.
    pub fn compress<'a>(&self, iri: &'a str) -> Cow<'a, str> {
        self.prefixes
            .iter()
            .filter(|(_, namespace)| iri.starts_with(namespace.as_str()))
            .max_by_key(|(_, namespace)| namespace.len())
            .map_or(Cow::Borrowed(iri), |(prefix, namespace)| {
                Cow::Owned(format!("{prefix}:{}", &iri[namespace.len()..]))
            })
    }
}

fn namespace_of(iri: &str) -> &str {
    iri.rfind(['#', '/'])
        .map_or(iri, |position| &iri[..=position])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_prefixes_only() {
        let manager = NamespaceManager::default();
        assert_eq!(
            manager.expand("nfo:fileName"),
            "http://tracker.api.gnome.org/ontology/v3/nfo#fileName"
        );
        assert_eq!(manager.expand("urn:a"), "urn:a");
        assert_eq!(manager.expand("http://example.com/x"), "http://example.com/x");
        assert_eq!(
            manager.expand("rdf:type"),
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#type"
        );
    }

    #[test]
    fn compress_uses_longest_namespace() {
        let mut manager = NamespaceManager::empty();
        manager.add_prefix("ex", "http://example.com/");
        manager.add_prefix("exv", "http://example.com/vocab#");
        assert_eq!(manager.compress("http://example.com/vocab#name"), "exv:name");
        assert_eq!(manager.compress("http://example.com/thing"), "ex:thing");
        assert_eq!(manager.compress("urn:other"), "urn:other");
    }
}
