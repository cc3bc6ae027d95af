//! The persisted form of the local model.
//!
//! The configuration tool stores state as JSON. `Unset` is stored as
//! `null`, sets as sorted arrays. An `Unknown` value only exists during
//! planning and has no persisted form.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::codec::json_kind;
use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{Attr, AttrPath, AttrValue, LocalObject, Presence};
use crate::schema::{AttributeKind, ObjectSchema, ScalarType};

/// Render `model` in its persisted JSON form.
pub fn to_state_json(model: &LocalObject) -> ReconcileResult<Value> {
    object_to_json(model, &AttrPath::root())
}

fn object_to_json(model: &LocalObject, path: &AttrPath) -> ReconcileResult<Value> {
    let mut out = Map::new();
    for (name, attr) in model.iter() {
        let field_path = path.child(name);
        let rendered = match attr {
            Presence::Unset => Value::Null,
            Presence::Unknown => {
                return Err(ReconcileError::state_mapping(
                    field_path.to_string(),
                    "an unknown value cannot be persisted",
                ))
            }
            Presence::Known(value) => value_to_json(value, &field_path)?,
        };
        out.insert(name.to_string(), rendered);
    }
    Ok(Value::Object(out))
}

fn value_to_json(value: &AttrValue, path: &AttrPath) -> ReconcileResult<Value> {
    Ok(match value {
        AttrValue::String(s) => Value::String(s.clone()),
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Int64(n) => Value::from(*n),
        AttrValue::List(items) => Value::Array(
            items
                .iter()
                .map(|v| value_to_json(v, path))
                .collect::<ReconcileResult<_>>()?,
        ),
        AttrValue::Set(items) => Value::Array(
            items
                .iter()
                .map(|v| value_to_json(v, path))
                .collect::<ReconcileResult<_>>()?,
        ),
        AttrValue::Object(obj) => object_to_json(obj, path)?,
    })
}

/// Parse a persisted JSON object back into the local model.
///
/// Every schema attribute is present in the result; keys the schema does
/// not declare are rejected.
pub fn from_state_json(schema: &ObjectSchema, value: &Value) -> ReconcileResult<LocalObject> {
    object_from_json(schema, value, &AttrPath::root())
}

fn object_from_json(schema: &ObjectSchema, value: &Value, path: &AttrPath) -> ReconcileResult<LocalObject> {
    let Value::Object(map) = value else {
        return Err(ReconcileError::state_mapping(
            path.to_string(),
            format!("expected object, got {}", json_kind(value)),
        ));
    };
    if let Some(extra) = map.keys().find(|k| schema.attribute(k).is_none()) {
        return Err(ReconcileError::state_mapping(
            path.child(extra).to_string(),
            "attribute is not declared by the schema",
        ));
    }

    let mut out = LocalObject::new();
    for attr in &schema.attributes {
        let field_path = path.child(attr.name);
        let parsed: Attr = match map.get(attr.name) {
            None | Some(Value::Null) => Attr::Unset,
            Some(raw) => Attr::Known(match &attr.kind {
                AttributeKind::Scalar(ty) => scalar_from_json(*ty, raw, &field_path)?,
                AttributeKind::List(ty) => AttrValue::List(
                    array_items(raw, &field_path)?
                        .iter()
                        .map(|v| scalar_from_json(*ty, v, &field_path))
                        .collect::<ReconcileResult<Vec<_>>>()?,
                ),
                AttributeKind::Set(ty) => AttrValue::Set(
                    array_items(raw, &field_path)?
                        .iter()
                        .map(|v| scalar_from_json(*ty, v, &field_path))
                        .collect::<ReconcileResult<BTreeSet<_>>>()?,
                ),
                AttributeKind::Object(nested) => {
                    AttrValue::Object(object_from_json(nested, raw, &field_path)?)
                }
            }),
        };
        out.set(attr.name, parsed);
    }
    Ok(out)
}

fn array_items<'a>(raw: &'a Value, path: &AttrPath) -> ReconcileResult<&'a Vec<Value>> {
    raw.as_array().ok_or_else(|| {
        ReconcileError::state_mapping(path.to_string(), format!("expected array, got {}", json_kind(raw)))
    })
}

fn scalar_from_json(ty: ScalarType, raw: &Value, path: &AttrPath) -> ReconcileResult<AttrValue> {
    match (ty, raw) {
        (ScalarType::String, Value::String(s)) => Ok(AttrValue::String(s.clone())),
        (ScalarType::Bool, Value::Bool(b)) => Ok(AttrValue::Bool(*b)),
        (ScalarType::Int64, Value::Number(n)) if n.is_i64() => {
            Ok(AttrValue::Int64(n.as_i64().unwrap_or_default()))
        }
        (ty, other) => Err(ReconcileError::state_mapping(
            path.to_string(),
            format!("expected {ty}, got {}", json_kind(other)),
        )),
    }
}
