//! Partial update tests.

mod common;

use openquery::{patch_record, Delta, Literal, QueryError, Timestamp, ValidationError};
use serde_json::json;

use common::Employee;

fn employee() -> Employee {
    Employee {
        revision: 3,
        ..Employee::new(1, "A", 30)
    }
}

#[test]
fn patch_changes_only_named_fields() {
    let delta = Delta::<Employee>::from_json(&json!({"age": 31})).unwrap();
    let after = delta.patched(employee()).unwrap();
    assert_eq!(
        after,
        Employee {
            age: Some(31),
            ..employee()
        }
    );
}

#[test]
fn present_null_differs_from_absent() {
    let cleared = Delta::<Employee>::from_json(&json!({"age": null})).unwrap();
    let untouched = Delta::<Employee>::from_json(&json!({})).unwrap();
    assert!(cleared.is_set("age"));
    assert!(!untouched.is_set("age"));
    assert!(untouched.is_empty());

    assert_eq!(cleared.patched(employee()).unwrap().age, None);
    assert_eq!(untouched.patched(employee()).unwrap().age, Some(30));
}

#[test]
fn writes_follow_declaration_order() {
    let mut target = employee();
    let written = Delta::<Employee>::from_json(&json!({
        "hired": "2024-01-29",
        "name": "B",
        "age": 40,
    }))
    .unwrap()
    .apply(&mut target)
    .unwrap();
    assert_eq!(written, ["name", "age", "hired"]);
    assert_eq!(target.hired, Timestamp::parse("2024-01-29"));
}

#[test]
fn rejects_unknown_immutable_and_mistyped_fields() {
    let bad = Delta::<Employee>::from_json(&json!({
        "salary": 10,
        "id": 2,
        "age": "old",
        "hired": "yesterday",
        "team": [],
    }))
    .unwrap_err();

    assert!(matches!(
        bad.for_parameter("salary"),
        Some(QueryError::UnknownField { name }) if name == "salary"
    ));
    assert!(matches!(
        bad.for_parameter("id"),
        Some(QueryError::ImmutableField { name }) if name == "id"
    ));
    assert!(matches!(
        bad.for_parameter("age"),
        Some(QueryError::TypeMismatch { expected, actual }) if expected == "number" && actual == "string"
    ));
    assert!(matches!(
        bad.for_parameter("hired"),
        Some(QueryError::TypeMismatch { expected, actual }) if expected == "date" && actual == "string"
    ));
    assert!(matches!(
        bad.for_parameter("team"),
        Some(QueryError::TypeMismatch { .. })
    ));
}

#[test]
fn integer_range_is_checked() {
    let bad = Delta::<Employee>::from_json(&json!({"revision": -1})).unwrap_err();
    assert!(matches!(
        bad.for_parameter("revision"),
        Some(QueryError::TypeMismatch { .. })
    ));
}

// ============================================================================
// Version checks
// ============================================================================

#[test]
fn matching_version_applies_without_writing_it() {
    let delta = Delta::<Employee>::from_json(&json!({"revision": 3, "name": "B"})).unwrap();
    assert_eq!(delta.expected_version(), Some(&Literal::from(3i64)));
    assert!(!delta.is_set("revision"));

    let after = delta.patched(employee()).unwrap();
    assert_eq!(after.name, "B");
    assert_eq!(after.revision, 3);
}

#[test]
fn stale_version_conflicts_and_leaves_record_unchanged() {
    let mut target = employee();
    let delta = Delta::<Employee>::from_json(&json!({"revision": 2, "name": "B"})).unwrap();
    let err = delta.apply(&mut target).unwrap_err();
    assert!(matches!(err, QueryError::Conflict { field } if field == "revision"));
    assert_eq!(target, employee());
}

#[test]
fn missing_version_is_applied_optimistically() {
    let delta = Delta::<Employee>::from_json(&json!({"name": "B"})).unwrap();
    assert_eq!(delta.expected_version(), None);
    assert_eq!(delta.patched(employee()).unwrap().name, "B");
}

// ============================================================================
// Patch flow
// ============================================================================

#[test]
fn patch_flow_reports_each_terminal_outcome() {
    let delta = || Delta::<Employee>::from_json(&json!({"name": ""})).unwrap();
    let validate = |e: &Employee| {
        if e.name.is_empty() {
            Err(vec![ValidationError::new("name", "must not be empty")])
        } else {
            Ok(())
        }
    };

    let missing = patch_record(None, delta(), validate);
    assert_eq!(missing.unwrap_err().kind(), "not_found");

    let invalid = patch_record(Some(employee()), delta(), validate).unwrap_err();
    assert_eq!(invalid.to_string(), "validation failed: name: must not be empty");

    let fine = Delta::<Employee>::from_json(&json!({"name": "C"})).unwrap();
    assert_eq!(
        patch_record(Some(employee()), fine, validate).unwrap().name,
        "C"
    );
}
