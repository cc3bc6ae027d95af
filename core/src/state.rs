//! Response body to local model, and drift detection between the two sides.
//!
//! # Design
//! `map_to_local` visits every bound field, not every wire key: keys the
//! table does not declare are ignored, and declared fields the service left
//! out are filled in according to their collection policy. An absent nested
//! object becomes the table's placeholder (every child in its absent state)
//! rather than `Unset`, so "object missing" and "object present with nothing
//! in it" read the same downstream.

use serde_json::{Map, Value};
use tracing::trace;

use crate::codec::{decode_collection, decode_scalar, json_kind, normalize_timestamp};
use crate::error::{ReconcileError, ReconcileResult};
use crate::mapping::{BoundField, BoundKind, CollectionPolicy, MappingTable, Transform};
use crate::model::{Attr, AttrPath, AttrValue, LocalObject, Presence};

/// Map a response body into the local model.
pub fn map_to_local(doc: &Value, table: &MappingTable) -> ReconcileResult<LocalObject> {
    let Value::Object(map) = doc else {
        return Err(ReconcileError::state_mapping(
            "",
            format!("expected a JSON object, got {}", json_kind(doc)),
        ));
    };
    let local = map_object(map, table, &AttrPath::root())?;
    trace!(fields = table.fields().len(), "mapped response body");
    Ok(local)
}

fn map_object(
    doc: &Map<String, Value>,
    table: &MappingTable,
    path: &AttrPath,
) -> ReconcileResult<LocalObject> {
    let mut out = LocalObject::new();

    for field in table.fields() {
        let field_path = path.child(field.local);
        let wire = lookup(doc, &field.remote, &field_path)?;

        let attr = match &field.kind {
            BoundKind::Scalar(ty) => match wire {
                None | Some(Value::Null) => Attr::Unset,
                Some(value) => Attr::Known(decode_scalar(value, *ty, field.transform, &field_path)?),
            },
            BoundKind::List(ty) => {
                decode_collection(wire, *ty, true, field.transform, field.policy, &field_path)?
            }
            BoundKind::Set(ty) => {
                decode_collection(wire, *ty, false, field.transform, field.policy, &field_path)?
            }
            BoundKind::Object(nested) => match wire {
                None | Some(Value::Null) => Attr::object(nested.placeholder()),
                Some(Value::Object(inner)) => Attr::object(map_object(inner, nested, &field_path)?),
                Some(other) => {
                    return Err(ReconcileError::state_mapping(
                        field_path.to_string(),
                        format!("expected object, got {}", json_kind(other)),
                    ))
                }
            },
        };
        out.set(field.local, attr);
    }

    Ok(out)
}

/// Follow a dotted wire path. Missing or `null` intermediates read as absent.
fn lookup<'a>(
    doc: &'a Map<String, Value>,
    remote: &[&str],
    path: &AttrPath,
) -> ReconcileResult<Option<&'a Value>> {
    let Some((last, parents)) = remote.split_last() else {
        return Ok(None);
    };
    let mut cursor = doc;
    for segment in parents {
        match cursor.get(*segment) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(map)) => cursor = map,
            Some(other) => {
                return Err(ReconcileError::state_mapping(
                    path.to_string(),
                    format!("wire key `{segment}` is a {}, not an object", json_kind(other)),
                ))
            }
        }
    }
    Ok(cursor.get(*last))
}

/// Attribute paths where a configured, known planned value is not reflected
/// by the observed model.
///
/// `Known(empty)` and `Unset` are equivalent for `NullIfEmpty` collections,
/// since the service cannot tell them apart.
pub fn drift(plan: &LocalObject, observed: &LocalObject, table: &MappingTable) -> Vec<String> {
    let mut out = Vec::new();
    drift_at(plan, observed, table, &AttrPath::root(), &mut out);
    out
}

fn drift_at(
    plan: &LocalObject,
    observed: &LocalObject,
    table: &MappingTable,
    path: &AttrPath,
    out: &mut Vec<String>,
) {
    for field in table.fields() {
        if !field.cardinality.is_configurable() {
            continue;
        }
        let Presence::Known(planned) = plan.get(field.local) else {
            continue;
        };
        let field_path = path.child(field.local);
        let seen = observed.get(field.local);

        match (&field.kind, planned) {
            (BoundKind::Object(nested), AttrValue::Object(planned_obj)) => match seen.known_object() {
                Some(seen_obj) => drift_at(planned_obj, seen_obj, nested, &field_path, out),
                None => drift_at(planned_obj, &nested.placeholder(), nested, &field_path, out),
            },
            _ => {
                if !equivalent(field, planned, seen) {
                    out.push(field_path.to_string());
                }
            }
        }
    }
}

fn equivalent(field: &BoundField, planned: &AttrValue, seen: &Attr) -> bool {
    let planned = canonical(field, planned);
    if field.policy == CollectionPolicy::NullIfEmpty && is_empty_collection(&planned) {
        return match seen {
            Presence::Unset => true,
            Presence::Known(v) => is_empty_collection(v),
            Presence::Unknown => false,
        };
    }
    seen.as_known() == Some(&planned)
}

fn canonical(field: &BoundField, value: &AttrValue) -> AttrValue {
    if field.transform != Transform::Timestamp {
        return value.clone();
    }
    let normalize = |v: &AttrValue| match v {
        AttrValue::String(s) => AttrValue::String(normalize_timestamp(s).unwrap_or_else(|| s.clone())),
        other => other.clone(),
    };
    match value {
        AttrValue::List(items) => AttrValue::List(items.iter().map(normalize).collect()),
        AttrValue::Set(items) => AttrValue::Set(items.iter().map(normalize).collect()),
        other => normalize(other),
    }
}

fn is_empty_collection(value: &AttrValue) -> bool {
    match value {
        AttrValue::List(items) => items.is_empty(),
        AttrValue::Set(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::construct;
    use crate::mapping::FieldMapping;
    use crate::schema::{AttributeSchema, Cardinality, ObjectSchema};
    use serde_json::json;

    fn table() -> MappingTable {
        let sign_in = ObjectSchema::new(vec![
            AttributeSchema::bool("is_enabled", Cardinality::Required),
            AttributeSchema::int64("value", Cardinality::Optional),
        ]);
        let schema = ObjectSchema::new(vec![
            AttributeSchema::string("id", Cardinality::Computed),
            AttributeSchema::string("created", Cardinality::Computed),
            AttributeSchema::string_set("client_app_types", Cardinality::Required),
            AttributeSchema::string_set("exclude_groups", Cardinality::Optional),
            AttributeSchema::string_list("ordered", Cardinality::Optional),
            AttributeSchema::object("sign_in_frequency", Cardinality::Optional, sign_in),
        ]);
        MappingTable::bind(
            &schema,
            &[
                FieldMapping::new("id", "id"),
                FieldMapping::new("created", "createdDateTime").transform(Transform::Timestamp),
                FieldMapping::new("client_app_types", "conditions.clientAppTypes"),
                FieldMapping::new("exclude_groups", "conditions.users.excludeGroups"),
                FieldMapping::new("ordered", "ordered"),
                FieldMapping::object(
                    "sign_in_frequency",
                    "sessionControls.signInFrequency",
                    vec![
                        FieldMapping::new("is_enabled", "isEnabled"),
                        FieldMapping::new("value", "value"),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn empty_required_set_maps_to_known_empty() {
        let local = map_to_local(&json!({ "conditions": { "clientAppTypes": [] } }), &table()).unwrap();
        assert_eq!(
            *local.get("client_app_types"),
            Attr::string_set(Vec::<String>::new())
        );
    }

    #[test]
    fn empty_optional_set_maps_to_unset() {
        let local = map_to_local(
            &json!({ "conditions": { "users": { "excludeGroups": [] } } }),
            &table(),
        )
        .unwrap();
        assert!(local.get("exclude_groups").is_unset());
    }

    #[test]
    fn absent_nested_object_becomes_placeholder() {
        let local = map_to_local(&json!({ "id": "p1" }), &table()).unwrap();
        let sif = local.get("sign_in_frequency").known_object().unwrap();
        assert!(sif.get("is_enabled").is_unset());
        assert!(sif.get("value").is_unset());

        let null_parent = map_to_local(&json!({ "sessionControls": null }), &table()).unwrap();
        assert_eq!(null_parent.get("sign_in_frequency"), local.get("sign_in_frequency"));
    }

    #[test]
    fn unknown_wire_keys_are_ignored() {
        let local = map_to_local(&json!({ "id": "p1", "@odata.context": "x" }), &table()).unwrap();
        assert_eq!(local.get("id").known_str(), Some("p1"));
    }

    #[test]
    fn timestamps_are_normalized() {
        let local = map_to_local(
            &json!({ "createdDateTime": "2024-05-01T12:00:00+01:00" }),
            &table(),
        )
        .unwrap();
        assert_eq!(local.get("created").known_str(), Some("2024-05-01T11:00:00Z"));
    }

    #[test]
    fn non_integral_number_is_rejected() {
        let err = map_to_local(
            &json!({ "sessionControls": { "signInFrequency": { "isEnabled": true, "value": 2.5 } } }),
            &table(),
        )
        .unwrap_err();
        match err {
            ReconcileError::StateMapping { path, .. } => assert_eq!(path, "sign_in_frequency.value"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn intermediate_scalar_is_rejected() {
        let err = map_to_local(&json!({ "conditions": "all" }), &table()).unwrap_err();
        assert!(matches!(err, ReconcileError::StateMapping { .. }));
    }

    #[test]
    fn mapping_is_idempotent() {
        let doc = json!({
            "id": "p1",
            "conditions": { "clientAppTypes": ["browser", "other"], "users": { "excludeGroups": ["g1"] } },
            "ordered": ["b", "a"]
        });
        let first = map_to_local(&doc, &table()).unwrap();
        let second = map_to_local(&doc, &table()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn construct_then_map_collapses_empty_optional() {
        let sif = LocalObject::new()
            .with("is_enabled", Attr::bool(true))
            .with("value", Attr::int64(12));
        let model = LocalObject::new()
            .with("client_app_types", Attr::string_set(Vec::<String>::new()))
            .with("exclude_groups", Attr::string_set(Vec::<String>::new()))
            .with("ordered", Attr::string_list(["z", "a"]))
            .with("sign_in_frequency", Attr::object(sif.clone()));
        let back = map_to_local(&construct(&model, &table()).unwrap(), &table()).unwrap();

        assert_eq!(back.get("client_app_types"), model.get("client_app_types"));
        assert!(back.get("exclude_groups").is_unset());
        assert_eq!(back.get("ordered"), model.get("ordered"));
        assert_eq!(*back.get("sign_in_frequency"), Attr::object(sif));
    }

    #[test]
    fn drift_ignores_null_if_empty_collapse_and_computed_fields() {
        let plan = LocalObject::new()
            .with("id", Attr::string("planned-id"))
            .with("exclude_groups", Attr::string_set(Vec::<String>::new()))
            .with("client_app_types", Attr::string_set(["browser"]));
        let observed = map_to_local(
            &json!({ "id": "p1", "conditions": { "clientAppTypes": ["browser"], "users": { "excludeGroups": [] } } }),
            &table(),
        )
        .unwrap();
        assert!(drift(&plan, &observed, &table()).is_empty());
    }

    #[test]
    fn drift_reports_nested_paths() {
        let plan = LocalObject::new().with(
            "sign_in_frequency",
            Attr::object(LocalObject::new().with("value", Attr::int64(4))),
        );
        let stale = map_to_local(
            &json!({ "sessionControls": { "signInFrequency": { "isEnabled": true, "value": 1 } } }),
            &table(),
        )
        .unwrap();
        assert_eq!(drift(&plan, &stale, &table()), vec!["sign_in_frequency.value"]);

        let missing = map_to_local(&json!({}), &table()).unwrap();
        assert_eq!(drift(&plan, &missing, &table()), vec!["sign_in_frequency.value"]);
    }
}
