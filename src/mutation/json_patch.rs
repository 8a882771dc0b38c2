// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! JSON patch application over JSON documents.

use super::pointer::JsonPointer;

use crate::error::MutationError;
use crate::schema::{NodeId, Schema};
use crate::types::ROOT_TYPE_NAME;

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Test => "test",
        })
    }
}

/// A patch operation whose operands have been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: JsonPointer,
    pub from: Option<JsonPointer>,
    pub value: Option<JsonValue>,
}

/// Result of applying a whole patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    Applied(JsonValue),
    /// A `test` operation failed. The document is left unchanged.
    TestFailed,
}

fn patch_error(op: &PatchOperation, reason: impl Into<String>) -> MutationError {
    MutationError::Patch {
        op: op.op.to_string(),
        path: op.path.to_string(),
        reason: reason.into(),
    }
}

/// Applies `ops` in order to a copy of `document`. Either every operation applies or none does.
pub fn apply_patch(
    document: &JsonValue,
    ops: &[PatchOperation],
) -> Result<PatchOutcome, MutationError> {
    let mut doc = document.clone();
    for op in ops {
        match op.op {
            PatchOp::Add => {
                let value = required_value(op)?;
                add(&mut doc, &op.path, value).map_err(|r| patch_error(op, r))?;
            }
            PatchOp::Remove => {
                remove(&mut doc, &op.path).map_err(|r| patch_error(op, r))?;
            }
            PatchOp::Replace => {
                let value = required_value(op)?;
                let target = lookup_mut(&mut doc, &op.path)
                    .ok_or_else(|| patch_error(op, "path does not exist"))?;
                *target = value;
            }
            PatchOp::Move => {
                let from = required_from(op)?;
                if from.is_proper_prefix_of(&op.path) {
                    return Err(patch_error(op, "cannot move a value into one of its children"));
                }
                let value = remove(&mut doc, from).map_err(|r| patch_error(op, r))?;
                add(&mut doc, &op.path, value).map_err(|r| patch_error(op, r))?;
            }
            PatchOp::Copy => {
                let from = required_from(op)?;
                let value = lookup(&doc, from)
                    .cloned()
                    .ok_or_else(|| patch_error(op, "from path does not exist"))?;
                add(&mut doc, &op.path, value).map_err(|r| patch_error(op, r))?;
            }
            PatchOp::Test => {
                let expected = op.value.as_ref().unwrap_or(&JsonValue::Null);
                match lookup(&doc, &op.path) {
                    Some(actual) if json_eq(actual, expected) => {}
                    _ => return Ok(PatchOutcome::TestFailed),
                }
            }
        }
    }
    Ok(PatchOutcome::Applied(doc))
}

fn required_value(op: &PatchOperation) -> Result<JsonValue, MutationError> {
    op.value
        .clone()
        .ok_or_else(|| patch_error(op, "value is required"))
}

fn required_from(op: &PatchOperation) -> Result<&JsonPointer, MutationError> {
    op.from
        .as_ref()
        .ok_or_else(|| patch_error(op, "from is required"))
}

/// Numbers compare by value so that `1` and `1.0` are equal.
fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

fn array_index(token: &str, len: usize) -> Result<usize, String> {
    // Leading zeros and signs are not valid array indices.
    if token.is_empty()
        || (token.len() > 1 && token.starts_with('0'))
        || !token.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid array index {token:?}"));
    }
    match token.parse::<usize>() {
        Ok(idx) if idx < len => Ok(idx),
        _ => Err(format!("array index {token} out of range")),
    }
}

fn lookup<'a>(doc: &'a JsonValue, pointer: &JsonPointer) -> Option<&'a JsonValue> {
    pointer
        .tokens()
        .iter()
        .try_fold(doc, |current, token| match current {
            JsonValue::Object(fields) => fields.get(token),
            JsonValue::Array(items) => items.get(array_index(token, items.len()).ok()?),
            _ => None,
        })
}

fn lookup_mut<'a>(doc: &'a mut JsonValue, pointer: &JsonPointer) -> Option<&'a mut JsonValue> {
    let mut current = doc;
    for token in pointer.tokens() {
        current = match current {
            JsonValue::Object(fields) => fields.get_mut(token)?,
            JsonValue::Array(items) => {
                let idx = array_index(token, items.len()).ok()?;
                items.get_mut(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn add(doc: &mut JsonValue, path: &JsonPointer, value: JsonValue) -> Result<(), String> {
    let Some((parent, last)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };
    match lookup_mut(doc, &parent) {
        Some(JsonValue::Object(fields)) => {
            fields.insert(last.to_string(), value);
            Ok(())
        }
        Some(JsonValue::Array(items)) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            // Inserting at the end is allowed.
            let idx = array_index(last, items.len() + 1)?;
            items.insert(idx, value);
            Ok(())
        }
        Some(_) => Err(format!("parent of {path} is not an object or array")),
        None => Err("parent path does not exist".to_string()),
    }
}

fn remove(doc: &mut JsonValue, path: &JsonPointer) -> Result<JsonValue, String> {
    let Some((parent, last)) = path.split_last() else {
        return Err("cannot remove the whole document".to_string());
    };
    match lookup_mut(doc, &parent) {
        Some(JsonValue::Object(fields)) => fields
            .remove(last)
            .ok_or_else(|| "path does not exist".to_string()),
        Some(JsonValue::Array(items)) => {
            let idx = array_index(last, items.len())?;
            Ok(items.remove(idx))
        }
        _ => Err("path does not exist".to_string()),
    }
}

/// Name of the object literal type that may be written at `path`, or `None` when the schema
/// does not describe the location.
///
/// Map keys and list indices do not contribute to the name.
pub fn object_type_name_at_path(schema: &Schema, path: &JsonPointer) -> Option<String> {
    let mut name = ROOT_TYPE_NAME.to_string();
    let mut node = schema.node(schema.root());
    for token in path.tokens() {
        let next: Option<NodeId> = if !node.properties.is_empty() {
            match node.properties.get(token) {
                Some(child) => {
                    name.push('.');
                    name.push_str(token);
                    Some(*child)
                }
                // Unknown properties keep the current type.
                None => None,
            }
        } else if let Some(values) = node.additional_properties {
            Some(values)
        } else if let Some(items) = node.items {
            Some(items)
        } else {
            return None;
        };
        if let Some(id) = next {
            node = schema.node(id);
        }
    }
    Some(name)
}
