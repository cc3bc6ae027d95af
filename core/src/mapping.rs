//! Per-resource field mapping tables.
//!
//! # Design
//! A resource declares one `FieldMapping` per schema attribute: the local
//! attribute name, the dotted wire path, an optional value transform and,
//! for nested objects, the nested mappings. `MappingTable::bind` checks the
//! declarations against the schema once, at initialization, and fails on
//! any drift between the two.
//!
//! The collection policy is never declared by hand. Binding derives it from
//! the schema's cardinality, so a field cannot end up with a policy that
//! disagrees with what the schema says about it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::error::SchemaError;
use crate::model::{Attr, AttrPath, AttrValue, LocalObject};
use crate::schema::{AttributeKind, Cardinality, ObjectSchema, ScalarType};

/// How empty and absent collections are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionPolicy {
    /// Empty encodes to `[]`; absent or empty decodes to `Known(empty)`.
    PreserveEmpty,
    /// Empty is omitted from the wire; absent, `null` or `[]` decodes to `Unset`.
    NullIfEmpty,
}

impl CollectionPolicy {
    pub fn for_cardinality(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Required | Cardinality::Computed => CollectionPolicy::PreserveEmpty,
            Cardinality::Optional | Cardinality::OptionalComputed => CollectionPolicy::NullIfEmpty,
        }
    }
}

/// Value transform applied between the local and wire representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    /// String restricted to a closed set of enum members.
    Enum(&'static [&'static str]),
    /// RFC 3339 timestamp, normalized to UTC.
    Timestamp,
    /// Graph flags enum: a comma-separated wire string expanded into a set.
    Flags(&'static [&'static str]),
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("identity"),
            Transform::Enum(_) => f.write_str("enum"),
            Transform::Timestamp => f.write_str("timestamp"),
            Transform::Flags(_) => f.write_str("flags"),
        }
    }
}

/// Declaration of one local attribute's wire counterpart.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub local: &'static str,
    pub remote: &'static str,
    pub transform: Transform,
    pub nested: Option<Vec<FieldMapping>>,
}

impl FieldMapping {
    pub fn new(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            transform: Transform::Identity,
            nested: None,
        }
    }

    pub fn object(local: &'static str, remote: &'static str, nested: Vec<FieldMapping>) -> Self {
        Self {
            local,
            remote,
            transform: Transform::Identity,
            nested: Some(nested),
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// Shape of a bound field.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundKind {
    Scalar(ScalarType),
    List(ScalarType),
    Set(ScalarType),
    Object(MappingTable),
}

/// A field mapping validated against its schema attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundField {
    pub local: &'static str,
    pub remote: Vec<&'static str>,
    pub cardinality: Cardinality,
    pub policy: CollectionPolicy,
    pub transform: Transform,
    pub kind: BoundKind,
}

impl BoundField {
    pub fn remote_path(&self) -> String {
        self.remote.join(".")
    }

    /// The local value the state mapper produces when the wire omits this field.
    pub fn absent_value(&self) -> Attr {
        match &self.kind {
            BoundKind::Scalar(_) => Attr::Unset,
            BoundKind::List(_) => match self.policy {
                CollectionPolicy::PreserveEmpty => Attr::Known(AttrValue::List(Vec::new())),
                CollectionPolicy::NullIfEmpty => Attr::Unset,
            },
            BoundKind::Set(_) => match self.policy {
                CollectionPolicy::PreserveEmpty => Attr::Known(AttrValue::Set(BTreeSet::new())),
                CollectionPolicy::NullIfEmpty => Attr::Unset,
            },
            BoundKind::Object(table) => Attr::object(table.placeholder()),
        }
    }
}

/// The validated mapping of one object level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    fields: Vec<BoundField>,
}

impl MappingTable {
    /// Bind `mappings` to `schema`, failing on any mismatch between them.
    pub fn bind(schema: &ObjectSchema, mappings: &[FieldMapping]) -> Result<Self, SchemaError> {
        Self::bind_at(&AttrPath::root(), schema, mappings)
    }

    fn bind_at(
        parent: &AttrPath,
        schema: &ObjectSchema,
        mappings: &[FieldMapping],
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let mut remotes: HashMap<String, &'static str> = HashMap::new();
        let mut fields = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            let path = parent.child(mapping.local);
            if !seen.insert(mapping.local) {
                return Err(SchemaError::DuplicateMapping(path.to_string()));
            }
            let attr = schema
                .attribute(mapping.local)
                .ok_or_else(|| SchemaError::UnknownAttribute(path.to_string()))?;

            let remote: Vec<&'static str> = mapping.remote.split('.').collect();
            if remote.iter().any(|segment| segment.is_empty()) {
                return Err(SchemaError::EmptyRemotePath(path.to_string()));
            }
            if let Some(first) = remotes.insert(mapping.remote.to_string(), mapping.local) {
                return Err(SchemaError::DuplicateRemote {
                    remote: mapping.remote.to_string(),
                    first: parent.child(first).to_string(),
                    second: path.to_string(),
                });
            }

            check_transform(&path, mapping.transform, &attr.kind)?;

            let kind = match (&attr.kind, &mapping.nested) {
                (AttributeKind::Object(nested_schema), Some(nested)) => {
                    BoundKind::Object(Self::bind_at(&path, nested_schema, nested)?)
                }
                (AttributeKind::Object(_), None) => {
                    return Err(SchemaError::MissingNested(path.to_string()))
                }
                (_, Some(_)) => return Err(SchemaError::UnexpectedNested(path.to_string())),
                (AttributeKind::Scalar(t), None) => BoundKind::Scalar(*t),
                (AttributeKind::List(t), None) => BoundKind::List(*t),
                (AttributeKind::Set(t), None) => BoundKind::Set(*t),
            };

            fields.push(BoundField {
                local: mapping.local,
                remote,
                cardinality: attr.cardinality,
                policy: CollectionPolicy::for_cardinality(attr.cardinality),
                transform: mapping.transform,
                kind,
            });
        }

        if let Some(missing) = schema.attributes.iter().find(|a| !seen.contains(a.name)) {
            return Err(SchemaError::Unmapped(parent.child(missing.name).to_string()));
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[BoundField] {
        &self.fields
    }

    pub fn field(&self, local: &str) -> Option<&BoundField> {
        self.fields.iter().find(|f| f.local == local)
    }

    /// A structurally complete object with every attribute in the state the
    /// state mapper gives it when the service omits it.
    pub fn placeholder(&self) -> LocalObject {
        self.fields
            .iter()
            .fold(LocalObject::new(), |obj, field| obj.with(field.local, field.absent_value()))
    }
}

fn check_transform(path: &AttrPath, transform: Transform, kind: &AttributeKind) -> Result<(), SchemaError> {
    let compatible = match transform {
        Transform::Identity => true,
        Transform::Enum(_) | Transform::Timestamp => matches!(
            kind,
            AttributeKind::Scalar(ScalarType::String)
                | AttributeKind::List(ScalarType::String)
                | AttributeKind::Set(ScalarType::String)
        ),
        Transform::Flags(_) => matches!(kind, AttributeKind::Set(ScalarType::String)),
    };
    if compatible {
        Ok(())
    } else {
        Err(SchemaError::TransformMismatch {
            path: path.to_string(),
            transform: transform.to_string(),
            kind: kind.to_string(),
        })
    }
}
