// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Merging of apply configurations into objects.
//!
//! Structs and granular maps merge field by field, map lists merge elements by key and set lists
//! take the union of their elements. Atomic structures can only be replaced as a whole, which an
//! apply configuration may not do, so they are rejected.

use crate::error::MutationError;
use crate::path::FieldPath;
use crate::schema::{Kind, ListType, MapType, NodeId, Schema};
use crate::value::Value;

use serde_json::Value as JsonValue;

/// Checks that every object literal in `value` is named after its field path from `expected`.
pub fn check_type_names(value: &Value, expected: &str) -> Result<(), MutationError> {
    let mut errors = Vec::new();
    collect_type_name_errors(value, expected, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MutationError::TypeMismatch(errors.join("; ")))
    }
}

fn collect_type_name_errors(value: &Value, expected: &str, errors: &mut Vec<String>) {
    match value {
        Value::Object(object) => {
            if object.type_name.as_ref() != expected {
                errors.push(format!(
                    "unexpected type name {:?}, expected {expected:?}, which matches field name path from root Object type",
                    object.type_name.as_ref()
                ));
            }
            for (name, field) in &object.fields {
                collect_type_name_errors(field, &format!("{expected}.{name}"), errors);
            }
        }
        Value::List(items) => items
            .iter()
            .for_each(|item| collect_type_name_errors(item, expected, errors)),
        Value::Map(entries) => entries
            .values()
            .for_each(|v| collect_type_name_errors(v, expected, errors)),
        _ => (),
    }
}

/// Paths of atomic lists, maps and structs that `patch` would write into.
pub fn find_atomics(schema: &Schema, patch: &JsonValue) -> Vec<String> {
    let mut atomics = Vec::new();
    collect_atomics(
        schema,
        Some(schema.root()),
        patch,
        &FieldPath::root(),
        &mut atomics,
    );
    atomics
}

fn collect_atomics(
    schema: &Schema,
    node: Option<NodeId>,
    value: &JsonValue,
    path: &FieldPath,
    atomics: &mut Vec<String>,
) {
    let Some(id) = node else {
        return;
    };
    let node = schema.node(id);
    match value {
        JsonValue::Object(fields) if matches!(node.kind, Kind::Object | Kind::Map | Kind::Any) => {
            if node.map_type == MapType::Atomic {
                atomics.push(path.to_string());
            }
            for (key, field) in fields {
                let (child, child_path) = match node.properties.get(key) {
                    Some(child) => (Some(*child), path.child(key)),
                    None => (node.additional_properties, path.key(key)),
                };
                collect_atomics(schema, child, field, &child_path, atomics);
            }
        }
        JsonValue::Array(items) if node.kind == Kind::Array => {
            if node.list_type == ListType::Atomic {
                atomics.push(path.to_string());
            }
            for (idx, item) in items.iter().enumerate() {
                collect_atomics(schema, node.items, item, &path.index(idx), atomics);
            }
        }
        _ => (),
    }
}

/// Merges `patch` into `live`, validating the patch first.
pub fn apply_configuration(
    schema: &Schema,
    live: &JsonValue,
    patch: &JsonValue,
) -> Result<JsonValue, MutationError> {
    let atomics = find_atomics(schema, patch);
    if !atomics.is_empty() {
        return Err(MutationError::AtomicMutation { paths: atomics });
    }
    let mut merged = live.clone();
    merge(schema, Some(schema.root()), &mut merged, patch);
    Ok(merged)
}

fn merge(schema: &Schema, node: Option<NodeId>, live: &mut JsonValue, patch: &JsonValue) {
    let node = node.map(|id| schema.node(id));
    match (live, patch) {
        (JsonValue::Object(live_fields), JsonValue::Object(patch_fields)) => {
            for (key, value) in patch_fields {
                let child = node.and_then(|n| {
                    n.properties
                        .get(key)
                        .copied()
                        .or(n.additional_properties)
                });
                match live_fields.get_mut(key) {
                    Some(existing) => merge(schema, child, existing, value),
                    None => {
                        live_fields.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (JsonValue::Array(live_items), JsonValue::Array(patch_items)) => {
            let list_type = node.map(|n| &n.list_type);
            let items = node.and_then(|n| n.items);
            match list_type {
                Some(ListType::Map(keys)) => {
                    for item in patch_items {
                        let same_key = |candidate: &&mut JsonValue| {
                            keys.iter().all(|k| candidate.get(k) == item.get(k))
                        };
                        match live_items.iter_mut().find(same_key) {
                            Some(existing) => merge(schema, items, existing, item),
                            None => live_items.push(item.clone()),
                        }
                    }
                }
                Some(ListType::Set) => {
                    for item in patch_items {
                        if !live_items.contains(item) {
                            live_items.push(item.clone());
                        }
                    }
                }
                _ => *live_items = patch_items.clone(),
            }
        }
        (live, patch) => *live = patch.clone(),
    }
}
