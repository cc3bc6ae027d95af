//! The local attribute model owned by the configuration tool.
//!
//! # Design
//! Every attribute is three-valued: `Unset`, `Unknown` (pending
//! computation) or `Known`. Sets are `BTreeSet`s so two sets with the same
//! members compare equal regardless of the order the service returned them
//! in. `LocalObject` reads a missing attribute as `Unset`, which lets callers
//! build sparse models without spelling out every field.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Presence state of a single attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Presence<T> {
    #[default]
    Unset,
    Unknown,
    Known(T),
}

impl<T> Presence<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Presence::Known(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Presence::Unset)
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            Presence::Known(value) => Some(value),
            _ => None,
        }
    }
}

/// A known attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Int64(i64),
    List(Vec<AttrValue>),
    Set(BTreeSet<AttrValue>),
    Object(LocalObject),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&LocalObject> {
        match self {
            AttrValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::String(_) => "string",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int64(_) => "int64",
            AttrValue::List(_) => "list",
            AttrValue::Set(_) => "set",
            AttrValue::Object(_) => "object",
        }
    }
}

/// An attribute slot in the local model.
pub type Attr = Presence<AttrValue>;

static UNSET: Attr = Presence::Unset;

impl Presence<AttrValue> {
    pub fn string(value: impl Into<String>) -> Self {
        Presence::Known(AttrValue::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Presence::Known(AttrValue::Bool(value))
    }

    pub fn int64(value: i64) -> Self {
        Presence::Known(AttrValue::Int64(value))
    }

    pub fn string_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Presence::Known(AttrValue::Set(
            values.into_iter().map(|v| AttrValue::String(v.into())).collect(),
        ))
    }

    pub fn string_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Presence::Known(AttrValue::List(
            values.into_iter().map(|v| AttrValue::String(v.into())).collect(),
        ))
    }

    pub fn object(value: LocalObject) -> Self {
        Presence::Known(AttrValue::Object(value))
    }

    /// The known string, if this attribute holds one.
    pub fn known_str(&self) -> Option<&str> {
        self.as_known().and_then(AttrValue::as_str)
    }

    /// The known nested object, if this attribute holds one.
    pub fn known_object(&self) -> Option<&LocalObject> {
        self.as_known().and_then(AttrValue::as_object)
    }
}

/// A nested object in the local model.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalObject {
    fields: BTreeMap<String, Attr>,
}

impl LocalObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: Attr) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Attr) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> &Attr {
        self.fields.get(name).unwrap_or(&UNSET)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attr)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when no attribute holds a known value.
    pub fn is_all_unset(&self) -> bool {
        self.fields.values().all(|v| !v.is_known())
    }
}

/// Dotted attribute path used in errors and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrPath(Vec<String>);

impl AttrPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        AttrPath(segments)
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}
