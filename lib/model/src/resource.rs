use crate::vocab::xsd;
use crate::{NamespaceManager, ResourceError};
use oxrdf::{BlankNode, Literal, NamedNode, NamedOrBlankNode, Term};
use oxsdatatypes::DateTime;

/// A value held by a [`Resource`] property.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceValue {
    /// A reference to another resource, either a (possibly prefixed) IRI or a `_:label`.
    Uri(String),
    /// A literal value.
    Literal(Literal),
    /// A nested resource that is inserted together with its parent.
    Relation(Box<Resource>),
}

#[derive(Clone, Debug, PartialEq)]
struct Property {
    name: String,
    values: Vec<ResourceValue>,
    overwrite: bool,
}

/// The bundle of predicate -> objects mappings describing a single subject.
///
/// Resources are built incrementally and handed to a batch for insertion. Properties keep the
/// order in which they were first set and every property holds an ordered set of values.
///
/// The `set_*` family replaces all values of a property and marks it as *overwritten*: inserting
/// the resource removes the values already stored for that property. The `add_*` family appends a
/// value and leaves stored values alone.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    identifier: String,
    properties: Vec<Property>,
}

/// A triple produced by [`Resource::statements`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceStatement {
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub object: Term,
    /// Whether the stored values of `(subject, predicate)` must be dropped first.
    pub overwrite: bool,
}

macro_rules! typed_setters {
    ($set:ident, $add:ident, $t:ty, $doc:literal) => {
        #[doc = concat!("Replaces the values of `property` with ", $doc, ".")]
        pub fn $set(&mut self, property: impl Into<String>, value: $t) {
            self.set_value(property.into(), ResourceValue::Literal(Literal::from(value)));
        }

        #[doc = concat!("Appends ", $doc, " to the values of `property`.")]
        pub fn $add(&mut self, property: impl Into<String>, value: $t) {
            self.add_value(property.into(), ResourceValue::Literal(Literal::from(value)));
        }
    };
}

impl Resource {
    /// Creates a resource.
    ///
    /// `None` creates an anonymous resource with a fresh `_:` identifier.
    pub fn new(identifier: Option<&str>) -> Self {
        Self {
            identifier: identifier.map_or_else(fresh_blank_identifier, str::to_owned),
            properties: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_identifier(&mut self, identifier: Option<&str>) {
        self.identifier = identifier.map_or_else(fresh_blank_identifier, str::to_owned);
    }

    /// Returns whether the identifier is a blank node label.
    pub fn is_blank(&self) -> bool {
        self.identifier.starts_with("_:")
    }

    typed_setters!(set_string, add_string, &str, "a plain string");
    typed_setters!(set_integer, add_integer, i64, "an `xsd:integer`");
    typed_setters!(set_double, add_double, f64, "an `xsd:double`");
    typed_setters!(set_boolean, add_boolean, bool, "an `xsd:boolean`");

    pub fn set_uri(&mut self, property: impl Into<String>, uri: impl Into<String>) {
        self.set_value(property.into(), ResourceValue::Uri(uri.into()));
    }

    pub fn add_uri(&mut self, property: impl Into<String>, uri: impl Into<String>) {
        self.add_value(property.into(), ResourceValue::Uri(uri.into()));
    }

    pub fn set_lang_string(
        &mut self,
        property: impl Into<String>,
        value: &str,
        language: &str,
    ) -> Result<(), oxrdf::LanguageTagParseError> {
        let literal = Literal::new_language_tagged_literal(value, language)?;
        self.set_value(property.into(), ResourceValue::Literal(literal));
        Ok(())
    }

    pub fn add_lang_string(
        &mut self,
        property: impl Into<String>,
        value: &str,
        language: &str,
    ) -> Result<(), oxrdf::LanguageTagParseError> {
        let literal = Literal::new_language_tagged_literal(value, language)?;
        self.add_value(property.into(), ResourceValue::Literal(literal));
        Ok(())
    }

    pub fn set_datetime(&mut self, property: impl Into<String>, value: DateTime) {
        self.set_value(property.into(), ResourceValue::Literal(datetime_literal(value)));
    }

    pub fn add_datetime(&mut self, property: impl Into<String>, value: DateTime) {
        self.add_value(property.into(), ResourceValue::Literal(datetime_literal(value)));
    }

    pub fn set_literal(&mut self, property: impl Into<String>, value: Literal) {
        self.set_value(property.into(), ResourceValue::Literal(value));
    }

    pub fn add_literal(&mut self, property: impl Into<String>, value: Literal) {
        self.add_value(property.into(), ResourceValue::Literal(value));
    }

    /// Replaces the values of `property` with a nested resource.
    pub fn set_relation(&mut self, property: impl Into<String>, resource: Resource) {
        self.set_value(property.into(), ResourceValue::Relation(Box::new(resource)));
    }

    pub fn add_relation(&mut self, property: impl Into<String>, resource: Resource) {
        self.add_value(property.into(), ResourceValue::Relation(Box::new(resource)));
    }

    /// Returns the values of `property`, empty if the property is not set.
    pub fn values(&self, property: &str) -> &[ResourceValue] {
        self.property(property)
            .map_or(&[], |property| property.values.as_slice())
    }

    pub fn first_value(&self, property: &str) -> Option<&ResourceValue> {
        self.values(property).first()
    }

    /// Returns the names of the set properties, in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|property| property.name.as_str())
    }

    /// Returns whether inserting this resource replaces the stored values of `property`.
    pub fn is_overwritten(&self, property: &str) -> bool {
        self.property(property).is_some_and(|property| property.overwrite)
    }

    pub fn remove_property(&mut self, property: &str) {
        self.properties.retain(|p| p.name != property);
    }

    /// Flattens the resource and its nested relations into triples.
    ///
    /// Prefixed names are expanded with `namespaces`. Blank node identifiers (`_:label`) are
    /// resolved through `resolve_blank`, which allows the caller to share a label mapping across
    /// several resources.
    pub fn statements(
        &self,
        namespaces: &NamespaceManager,
        resolve_blank: &mut dyn FnMut(&str) -> NamedOrBlankNode,
    ) -> Result<Vec<ResourceStatement>, ResourceError> {
        let mut statements = Vec::new();
        self.collect_statements(namespaces, resolve_blank, &mut statements)?;
        Ok(statements)
    }

    fn collect_statements(
        &self,
        namespaces: &NamespaceManager,
        resolve_blank: &mut dyn FnMut(&str) -> NamedOrBlankNode,
        statements: &mut Vec<ResourceStatement>,
    ) -> Result<NamedOrBlankNode, ResourceError> {
        let subject = self.resolve(&self.identifier, namespaces, resolve_blank)?;
        for property in &self.properties {
            if property.name.is_empty() {
                return Err(ResourceError::EmptyPropertyName(self.identifier.clone()));
            }
            let predicate = namespaces
                .expand_named_node(&property.name)
                .map_err(|error| ResourceError::InvalidIri {
                    resource: self.identifier.clone(),
                    iri: namespaces.expand(&property.name).into_owned(),
                    error,
                })?;
            for value in &property.values {
                let object = match value {
                    ResourceValue::Uri(uri) => {
                        Term::from(self.resolve(uri, namespaces, resolve_blank)?)
                    }
                    ResourceValue::Literal(literal) => Term::from(literal.clone()),
                    ResourceValue::Relation(nested) => Term::from(nested.collect_statements(
                        namespaces,
                        resolve_blank,
                        statements,
                    )?),
                };
                statements.push(ResourceStatement {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                    overwrite: property.overwrite,
                });
            }
        }
        Ok(subject)
    }

    fn resolve(
        &self,
        identifier: &str,
        namespaces: &NamespaceManager,
        resolve_blank: &mut dyn FnMut(&str) -> NamedOrBlankNode,
    ) -> Result<NamedOrBlankNode, ResourceError> {
        if let Some(label) = identifier.strip_prefix("_:") {
            return Ok(resolve_blank(label));
        }
        namespaces
            .expand_named_node(identifier)
            .map(NamedOrBlankNode::from)
            .map_err(|error| ResourceError::InvalidIri {
                resource: self.identifier.clone(),
                iri: namespaces.expand(identifier).into_owned(),
                error,
            })
    }

    fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn set_value(&mut self, name: String, value: ResourceValue) {
        if let Some(property) = self.properties.iter_mut().find(|p| p.name == name) {
            property.values = vec![value];
            property.overwrite = true;
        } else {
            self.properties.push(Property {
                name,
                values: vec![value],
                overwrite: true,
            });
        }
    }

    fn add_value(&mut self, name: String, value: ResourceValue) {
        if let Some(property) = self.properties.iter_mut().find(|p| p.name == name) {
            if !property.values.contains(&value) {
                property.values.push(value);
            }
        } else {
            self.properties.push(Property {
                name,
                values: vec![value],
                overwrite: false,
            });
        }
    }
}

fn fresh_blank_identifier() -> String {
    format!("_:{}", BlankNode::default().as_str())
}

fn datetime_literal(value: DateTime) -> Literal {
    Literal::new_typed_literal(value.to_string(), xsd::DATE_TIME)
}
