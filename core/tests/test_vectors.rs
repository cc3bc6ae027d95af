//! Verify the mappers against JSON test vectors stored in `test-vectors/`.
//!
//! Construct vectors hold a local model in its persisted form and the exact
//! request body it must produce. State vectors hold a response body and the
//! persisted-form values it must map to; only the keys a vector names are
//! compared, so each vector stays focused on the behaviour it documents.

use m365_core::resources::{conditional_access_policy, conditional_access_template, resource_operation};
use m365_core::{construct, from_state_json, map_to_local, to_state_json, MappingTable, ObjectSchema, ReconcileError};
use serde_json::Value;

fn definition(name: &str) -> (ObjectSchema, MappingTable) {
    match name {
        "conditional_access_policy" => {
            let def = conditional_access_policy::resource().unwrap();
            (def.schema, def.table)
        }
        "conditional_access_template" => {
            let def = conditional_access_template::data_source().unwrap();
            (def.schema, def.table)
        }
        "resource_operation" => {
            let def = resource_operation::resource().unwrap();
            (def.schema, def.table)
        }
        other => panic!("unknown resource in vector: {other}"),
    }
}

/// Every key of `expected` must be present in `actual` with the same value;
/// objects are compared key by key.
fn assert_subset(expected: &Value, actual: &Value, at: &str, name: &str) {
    match (expected, actual) {
        (Value::Object(want), Value::Object(got)) => {
            for (key, value) in want {
                let path = if at.is_empty() { key.clone() } else { format!("{at}.{key}") };
                let Some(found) = got.get(key) else {
                    panic!("{name}: `{path}` missing from mapped state");
                };
                assert_subset(value, found, &path, name);
            }
        }
        _ => assert_eq!(actual, expected, "{name}: `{at}`"),
    }
}

fn error_path(err: &ReconcileError) -> &str {
    match err {
        ReconcileError::Construction { path, .. } | ReconcileError::StateMapping { path, .. } => path,
        other => panic!("expected a path-carrying error, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Construct
// ---------------------------------------------------------------------------

#[test]
fn construct_test_vectors() {
    let raw = include_str!("../../test-vectors/construct.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let (schema, table) = definition(case["resource"].as_str().unwrap());

        let model = from_state_json(&schema, &case["model"]).unwrap();
        let body = construct(&model, &table).unwrap();
        assert_eq!(body, case["expected_body"], "{name}: body");
    }
}

#[test]
fn construct_error_vectors() {
    let raw = include_str!("../../test-vectors/construct.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["errors"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let (schema, table) = definition(case["resource"].as_str().unwrap());

        let model = from_state_json(&schema, &case["model"]).unwrap();
        let err = construct(&model, &table).unwrap_err();
        assert!(matches!(err, ReconcileError::Construction { .. }), "{name}: {err}");
        assert_eq!(error_path(&err), case["expected_path"].as_str().unwrap(), "{name}: path");
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[test]
fn state_test_vectors() {
    let raw = include_str!("../../test-vectors/state.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let (schema, table) = definition(case["resource"].as_str().unwrap());

        let local = map_to_local(&case["document"], &table).unwrap();
        let state = to_state_json(&local).unwrap();
        assert_subset(&case["expected_state"], &state, "", name);

        // The persisted form reads back to the same model.
        assert_eq!(from_state_json(&schema, &state).unwrap(), local, "{name}: reload");
    }
}

#[test]
fn state_error_vectors() {
    let raw = include_str!("../../test-vectors/state.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["errors"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let (_, table) = definition(case["resource"].as_str().unwrap());

        let err = map_to_local(&case["document"], &table).unwrap_err();
        assert!(matches!(err, ReconcileError::StateMapping { .. }), "{name}: {err}");
        assert_eq!(error_path(&err), case["expected_path"].as_str().unwrap(), "{name}: path");
    }
}
