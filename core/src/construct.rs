//! Local model to request body.
//!
//! # Design
//! `construct` is a pure walk over the mapping table. Unset and unknown
//! attributes are left out of the body entirely (never sent as `null`) so
//! the service keeps its own defaults. `Computed` attributes are never sent.
//! A nested object is emitted only when at least one of its descendants
//! produced a wire value. Construction is all-or-nothing.

use serde_json::{Map, Value};
use tracing::trace;

use crate::codec::{encode_collection, encode_scalar, json_kind};
use crate::error::{ReconcileError, ReconcileResult};
use crate::mapping::{BoundKind, MappingTable};
use crate::model::{AttrPath, AttrValue, LocalObject, Presence};

/// Build the request body for `model`.
pub fn construct(model: &LocalObject, table: &MappingTable) -> ReconcileResult<Value> {
    let body = construct_object(model, table, &AttrPath::root())?;
    trace!(keys = body.len(), "constructed request body");
    Ok(Value::Object(body))
}

fn construct_object(
    model: &LocalObject,
    table: &MappingTable,
    path: &AttrPath,
) -> ReconcileResult<Map<String, Value>> {
    let mut out = Map::new();

    for field in table.fields() {
        if !field.cardinality.is_configurable() {
            continue;
        }
        let Presence::Known(value) = model.get(field.local) else {
            continue;
        };
        let field_path = path.child(field.local);

        let encoded = match (&field.kind, value) {
            (BoundKind::Scalar(ty), value) => {
                Some(encode_scalar(value, *ty, field.transform, &field_path)?)
            }
            (BoundKind::List(ty), value @ AttrValue::List(_))
            | (BoundKind::Set(ty), value @ AttrValue::Set(_)) => {
                encode_collection(value, *ty, field.transform, field.policy, &field_path)?
            }
            (BoundKind::Object(nested), AttrValue::Object(obj)) => {
                let inner = construct_object(obj, nested, &field_path)?;
                (!inner.is_empty()).then_some(Value::Object(inner))
            }
            (kind, other) => {
                return Err(ReconcileError::construction(
                    field_path.to_string(),
                    format!("expected {}, got {}", kind_label(kind), other.kind_name()),
                ))
            }
        };

        if let Some(wire) = encoded {
            set_path(&mut out, &field.remote, wire, &field_path)?;
        }
    }

    Ok(out)
}

fn kind_label(kind: &BoundKind) -> &'static str {
    match kind {
        BoundKind::Scalar(_) => "scalar",
        BoundKind::List(_) => "list",
        BoundKind::Set(_) => "set",
        BoundKind::Object(_) => "object",
    }
}

/// Insert `value` at a dotted wire path, creating intermediate objects.
fn set_path(
    doc: &mut Map<String, Value>,
    remote: &[&str],
    value: Value,
    path: &AttrPath,
) -> ReconcileResult<()> {
    let Some((last, parents)) = remote.split_last() else {
        return Err(ReconcileError::construction(path.to_string(), "empty remote path"));
    };

    let mut cursor = doc;
    for segment in parents {
        let slot = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cursor = match slot {
            Value::Object(map) => map,
            other => {
                return Err(ReconcileError::construction(
                    path.to_string(),
                    format!("wire key `{segment}` already holds a {}", json_kind(other)),
                ))
            }
        };
    }
    cursor.insert(last.to_string(), value);
    Ok(())
}
