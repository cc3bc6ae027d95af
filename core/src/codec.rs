//! Collection-semantics codec and scalar transforms.
//!
//! # Design
//! Collections are three-valued on both sides. `encode_collection` returns
//! `None` when the field must be left out of the request body and
//! `decode_collection` returns `Attr::Unset` when the field must be left
//! unset locally; which of the two applies to an empty collection is decided
//! by the field's `CollectionPolicy`.
//!
//! Element transforms run before the collection policy. A failing element
//! fails the whole field: elements are never dropped.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{ReconcileError, ReconcileResult};
use crate::mapping::{CollectionPolicy, Transform};
use crate::model::{Attr, AttrPath, AttrValue};
use crate::schema::ScalarType;

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encode,
    Decode,
}

fn fail(direction: Direction, path: &AttrPath, message: String) -> ReconcileError {
    match direction {
        Direction::Encode => ReconcileError::construction(path.to_string(), message),
        Direction::Decode => ReconcileError::state_mapping(path.to_string(), message),
    }
}

/// Encode a known local collection into its wire form, or `None` to omit it.
pub fn encode_collection(
    value: &AttrValue,
    elem: ScalarType,
    transform: Transform,
    policy: CollectionPolicy,
    path: &AttrPath,
) -> ReconcileResult<Option<Value>> {
    let items: Vec<&AttrValue> = match value {
        AttrValue::List(items) => items.iter().collect(),
        AttrValue::Set(items) => items.iter().collect(),
        other => {
            return Err(ReconcileError::construction(
                path.to_string(),
                format!("expected a collection, got {}", other.kind_name()),
            ))
        }
    };

    if let Transform::Flags(allowed) = transform {
        let mut members = Vec::with_capacity(items.len());
        for item in &items {
            let member = item.as_str().ok_or_else(|| {
                ReconcileError::construction(
                    path.to_string(),
                    format!("expected string flag, got {}", item.kind_name()),
                )
            })?;
            check_member(Direction::Encode, path, member, allowed)?;
            members.push(member);
        }
        return Ok(match (members.is_empty(), policy) {
            (true, CollectionPolicy::NullIfEmpty) => None,
            _ => Some(Value::String(members.join(","))),
        });
    }

    let encoded = items
        .into_iter()
        .map(|item| encode_scalar(item, elem, transform, path))
        .collect::<ReconcileResult<Vec<Value>>>()?;

    Ok(match (encoded.is_empty(), policy) {
        (true, CollectionPolicy::NullIfEmpty) => None,
        _ => Some(Value::Array(encoded)),
    })
}

/// Decode a wire collection (or its absence) into a local attribute.
pub fn decode_collection(
    wire: Option<&Value>,
    elem: ScalarType,
    ordered: bool,
    transform: Transform,
    policy: CollectionPolicy,
    path: &AttrPath,
) -> ReconcileResult<Attr> {
    let items: Vec<AttrValue> = match (wire, transform) {
        (None | Some(Value::Null), _) => Vec::new(),
        (Some(Value::String(raw)), Transform::Flags(allowed)) => raw
            .split(',')
            .map(str::trim)
            .filter(|member| !member.is_empty())
            .map(|member| {
                check_member(Direction::Decode, path, member, allowed)?;
                Ok(AttrValue::String(member.to_string()))
            })
            .collect::<ReconcileResult<Vec<_>>>()?,
        (Some(Value::Array(values)), transform) if !matches!(transform, Transform::Flags(_)) => values
            .iter()
            .map(|v| decode_scalar(v, elem, transform, path))
            .collect::<ReconcileResult<Vec<_>>>()?,
        (Some(other), _) => {
            return Err(ReconcileError::state_mapping(
                path.to_string(),
                format!("expected {}, got {}", collection_shape(transform), json_kind(other)),
            ))
        }
    };

    if items.is_empty() && policy == CollectionPolicy::NullIfEmpty {
        return Ok(Attr::Unset);
    }
    Ok(Attr::Known(if ordered {
        AttrValue::List(items)
    } else {
        AttrValue::Set(items.into_iter().collect::<BTreeSet<_>>())
    }))
}

/// Encode one scalar, applying its transform.
pub fn encode_scalar(
    value: &AttrValue,
    ty: ScalarType,
    transform: Transform,
    path: &AttrPath,
) -> ReconcileResult<Value> {
    match (ty, value) {
        (ScalarType::String, AttrValue::String(s)) => {
            Ok(Value::String(apply_string_transform(Direction::Encode, path, s, transform)?))
        }
        (ScalarType::Bool, AttrValue::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarType::Int64, AttrValue::Int64(n)) => Ok(Value::from(*n)),
        (ty, other) => Err(ReconcileError::construction(
            path.to_string(),
            format!("expected {ty}, got {}", other.kind_name()),
        )),
    }
}

/// Decode one wire scalar, applying its transform.
pub fn decode_scalar(
    wire: &Value,
    ty: ScalarType,
    transform: Transform,
    path: &AttrPath,
) -> ReconcileResult<AttrValue> {
    match (ty, wire) {
        (ScalarType::String, Value::String(s)) => Ok(AttrValue::String(apply_string_transform(
            Direction::Decode,
            path,
            s,
            transform,
        )?)),
        (ScalarType::Bool, Value::Bool(b)) => Ok(AttrValue::Bool(*b)),
        (ScalarType::Int64, wire) => decode_int64(wire, path).map(AttrValue::Int64),
        (ty, other) => Err(ReconcileError::state_mapping(
            path.to_string(),
            format!("expected {ty}, got {}", json_kind(other)),
        )),
    }
}

/// Widen a wire number into `i64`, rejecting anything that would lose precision.
fn decode_int64(wire: &Value, path: &AttrPath) -> ReconcileResult<i64> {
    let out_of_range = |shown: &dyn std::fmt::Display| {
        ReconcileError::state_mapping(
            path.to_string(),
            format!("{shown} does not fit a 64-bit signed integer"),
        )
    };
    match wire {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(u) = n.as_u64() {
                Err(out_of_range(&u))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                // 2^63 is exactly representable; anything at or above it overflows.
                if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
                    Ok(f as i64)
                } else if f.fract() != 0.0 {
                    Err(ReconcileError::state_mapping(
                        path.to_string(),
                        format!("{f} is not an integer"),
                    ))
                } else {
                    Err(out_of_range(&f))
                }
            }
        }
        // OData may encode Int64 as a string when IEEE754Compatible is negotiated.
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
            ReconcileError::state_mapping(path.to_string(), format!("\"{s}\" is not a 64-bit signed integer"))
        }),
        other => Err(ReconcileError::state_mapping(
            path.to_string(),
            format!("expected int64, got {}", json_kind(other)),
        )),
    }
}

fn apply_string_transform(
    direction: Direction,
    path: &AttrPath,
    value: &str,
    transform: Transform,
) -> ReconcileResult<String> {
    match transform {
        Transform::Identity => Ok(value.to_string()),
        Transform::Enum(allowed) => {
            check_member(direction, path, value, allowed)?;
            Ok(value.to_string())
        }
        Transform::Timestamp => normalize_timestamp(value)
            .ok_or_else(|| fail(direction, path, format!("\"{value}\" is not an RFC 3339 timestamp"))),
        Transform::Flags(_) => Err(fail(
            direction,
            path,
            "flags transform applies to whole collections only".to_string(),
        )),
    }
}

fn check_member(
    direction: Direction,
    path: &AttrPath,
    value: &str,
    allowed: &[&str],
) -> ReconcileResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(fail(
            direction,
            path,
            format!("\"{value}\" is not one of: {}", allowed.join(", ")),
        ))
    }
}

/// Canonical UTC rendering of an RFC 3339 timestamp.
pub fn normalize_timestamp(value: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn collection_shape(transform: Transform) -> &'static str {
    match transform {
        Transform::Flags(_) => "comma-separated flags string",
        _ => "array",
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
