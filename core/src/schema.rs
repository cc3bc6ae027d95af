//! Attribute schema description consumed from the configuration tool.
//!
//! Only the parts the reconciliation core needs are modelled: each
//! attribute's cardinality and its collection kind.

use std::fmt;

/// Declared cardinality of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Required,
    Optional,
    Computed,
    OptionalComputed,
}

impl Cardinality {
    /// Whether the practitioner may set this attribute in configuration.
    pub fn is_configurable(self) -> bool {
        !matches!(self, Cardinality::Computed)
    }
}

/// Element or scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Bool,
    Int64,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::String => "string",
            ScalarType::Bool => "bool",
            ScalarType::Int64 => "int64",
        };
        f.write_str(name)
    }
}

/// Collection semantics of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Scalar(ScalarType),
    List(ScalarType),
    Set(ScalarType),
    Object(ObjectSchema),
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Scalar(t) => write!(f, "{t}"),
            AttributeKind::List(t) => write!(f, "list of {t}"),
            AttributeKind::Set(t) => write!(f, "set of {t}"),
            AttributeKind::Object(_) => f.write_str("object"),
        }
    }
}

/// One attribute declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub cardinality: Cardinality,
    pub kind: AttributeKind,
}

impl AttributeSchema {
    pub fn new(name: &'static str, cardinality: Cardinality, kind: AttributeKind) -> Self {
        Self {
            name,
            cardinality,
            kind,
        }
    }

    pub fn string(name: &'static str, cardinality: Cardinality) -> Self {
        Self::new(name, cardinality, AttributeKind::Scalar(ScalarType::String))
    }

    pub fn bool(name: &'static str, cardinality: Cardinality) -> Self {
        Self::new(name, cardinality, AttributeKind::Scalar(ScalarType::Bool))
    }

    pub fn int64(name: &'static str, cardinality: Cardinality) -> Self {
        Self::new(name, cardinality, AttributeKind::Scalar(ScalarType::Int64))
    }

    pub fn string_set(name: &'static str, cardinality: Cardinality) -> Self {
        Self::new(name, cardinality, AttributeKind::Set(ScalarType::String))
    }

    pub fn string_list(name: &'static str, cardinality: Cardinality) -> Self {
        Self::new(name, cardinality, AttributeKind::List(ScalarType::String))
    }

    pub fn object(name: &'static str, cardinality: Cardinality, schema: ObjectSchema) -> Self {
        Self::new(name, cardinality, AttributeKind::Object(schema))
    }
}

/// The attributes of one resource, data source or nested block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub attributes: Vec<AttributeSchema>,
}

impl ObjectSchema {
    pub fn new(attributes: Vec<AttributeSchema>) -> Self {
        Self { attributes }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Derive the schema of a read-only data source from a resource schema.
    ///
    /// Top-level `lookup_keys` become `OptionalComputed` so the practitioner
    /// can query by them; every other attribute, at every depth, becomes
    /// `Computed`.
    pub fn for_data_source(&self, lookup_keys: &[&str]) -> ObjectSchema {
        let attributes = self
            .attributes
            .iter()
            .map(|attr| {
                let cardinality = if lookup_keys.contains(&attr.name) {
                    Cardinality::OptionalComputed
                } else {
                    Cardinality::Computed
                };
                let kind = match &attr.kind {
                    AttributeKind::Object(nested) => AttributeKind::Object(nested.for_data_source(&[])),
                    other => other.clone(),
                };
                AttributeSchema::new(attr.name, cardinality, kind)
            })
            .collect();
        ObjectSchema { attributes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectSchema {
        ObjectSchema::new(vec![
            AttributeSchema::string("id", Cardinality::Computed),
            AttributeSchema::string("display_name", Cardinality::Required),
            AttributeSchema::object(
                "grant_controls",
                Cardinality::Optional,
                ObjectSchema::new(vec![AttributeSchema::string_set(
                    "built_in_controls",
                    Cardinality::Optional,
                )]),
            ),
        ])
    }

    #[test]
    fn only_computed_is_not_configurable() {
        assert!(Cardinality::Required.is_configurable());
        assert!(Cardinality::OptionalComputed.is_configurable());
        assert!(!Cardinality::Computed.is_configurable());
    }

    #[test]
    fn data_source_schema_marks_lookup_keys() {
        let ds = sample().for_data_source(&["id", "display_name"]);
        assert_eq!(ds.attribute("id").unwrap().cardinality, Cardinality::OptionalComputed);
        assert_eq!(
            ds.attribute("display_name").unwrap().cardinality,
            Cardinality::OptionalComputed
        );
        let grant = ds.attribute("grant_controls").unwrap();
        assert_eq!(grant.cardinality, Cardinality::Computed);
        match &grant.kind {
            AttributeKind::Object(nested) => assert_eq!(
                nested.attribute("built_in_controls").unwrap().cardinality,
                Cardinality::Computed
            ),
            other => panic!("unexpected kind {other}"),
        }
    }
}
