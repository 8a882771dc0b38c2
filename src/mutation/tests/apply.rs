// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::deployment_schema;

use crate::error::MutationError;
use crate::mutation::{apply_configuration, check_type_names, find_atomics};
use crate::value::{ObjectValue, Value};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

fn object(type_name: &str, fields: Vec<(&str, Value)>) -> Value {
    Value::Object(Arc::new(ObjectValue {
        type_name: Arc::from(type_name),
        fields: fields
            .into_iter()
            .map(|(k, v)| (Arc::from(k), v))
            .collect::<BTreeMap<_, _>>(),
    }))
}

#[test]
fn merges_granular_structures() {
    let schema = deployment_schema();
    let live = json!({
        "spec": {
            "replicas": 1,
            "tags": ["a"],
            "containers": [{"name": "web", "image": "nginx:1"}, {"name": "log", "image": "fluentd"}]
        }
    });
    let patch = json!({
        "spec": {
            "replicas": 3,
            "tags": ["a", "b"],
            "containers": [{"name": "web", "image": "nginx:2"}, {"name": "proxy", "image": "envoy"}]
        }
    });
    let merged = apply_configuration(&schema, &live, &patch).unwrap();
    assert_eq!(
        merged,
        json!({
            "spec": {
                "replicas": 3,
                "tags": ["a", "b"],
                "containers": [
                    {"name": "web", "image": "nginx:2"},
                    {"name": "log", "image": "fluentd"},
                    {"name": "proxy", "image": "envoy"}
                ]
            }
        })
    );
}

#[test]
fn merges_map_entries() {
    let schema = deployment_schema();
    let live = json!({"metadata": {"labels": {"app": "web"}}});
    let patch = json!({"metadata": {"labels": {"tier": "frontend"}}});
    let merged = apply_configuration(&schema, &live, &patch).unwrap();
    assert_eq!(
        merged,
        json!({"metadata": {"labels": {"app": "web", "tier": "frontend"}}})
    );
}

#[test]
fn rejects_atomic_targets() {
    let schema = deployment_schema();
    let patch = json!({"spec": {"selector": {"app": "web"}, "args": ["--v=2"]}});
    assert_eq!(
        find_atomics(&schema, &patch),
        vec!["spec.args".to_string(), "spec.selector".to_string()]
    );
    let err = apply_configuration(&schema, &json!({}), &patch).unwrap_err();
    assert!(matches!(err, MutationError::AtomicMutation { paths } if paths.len() == 2));

    // Scalars and granular structures are fine.
    assert!(find_atomics(&schema, &json!({"spec": {"replicas": 2, "tags": ["x"]}})).is_empty());
}

#[test]
fn type_names_follow_field_paths() {
    let good = object(
        "Object",
        vec![(
            "spec",
            object(
                "Object.spec",
                vec![(
                    "containers",
                    Value::from(vec![object(
                        "Object.spec.containers",
                        vec![("name", Value::from("web"))],
                    )]),
                )],
            ),
        )],
    );
    check_type_names(&good, "Object").unwrap();

    let bad = object(
        "Object",
        vec![("spec", object("Object.metadata", vec![]))],
    );
    let err = check_type_names(&bad, "Object").unwrap_err();
    let MutationError::TypeMismatch(message) = err else {
        panic!("unexpected error {err:?}");
    };
    assert!(message.contains("\"Object.metadata\""), "{message}");
    assert!(message.contains("\"Object.spec\""), "{message}");
}
