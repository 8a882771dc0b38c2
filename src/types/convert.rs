// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use crate::builtins::time::parse_duration;
use crate::schema::{Kind, NodeId, Schema};
use crate::value::Value;

/// Converts a whole object, typed by the root of `schema` when there is one.
pub fn object_value(schema: Option<&Schema>, json: &JsonValue) -> Value {
    match schema {
        Some(schema) => schema_value(schema, Some(schema.root()), json),
        None => Value::from_json(json),
    }
}

/// Converts a JSON document into a runtime value, using the schema node to pick numeric and
/// string representations. Without a node the conversion is untyped.
pub fn schema_value(schema: &Schema, node: Option<NodeId>, json: &JsonValue) -> Value {
    let Some(id) = node else {
        return Value::from_json(json);
    };
    let node = schema.node(id);
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match node.kind {
            Kind::Number => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            _ => Value::from_json(json),
        },
        JsonValue::String(s) => match (node.kind, node.format.as_deref()) {
            (Kind::String, Some("binary")) => Value::Bytes(Arc::from(s.as_bytes())),
            (Kind::String, Some("duration")) => parse_duration(s)
                .map(Value::Duration)
                .unwrap_or_else(|_| Value::from(s.as_str())),
            (Kind::String, Some("date-time")) => DateTime::parse_from_rfc3339(s)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .unwrap_or_else(|_| Value::from(s.as_str())),
            (Kind::String, Some("date")) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| Value::Timestamp(t.and_utc()))
                .unwrap_or_else(|| Value::from(s.as_str())),
            _ => Value::from(s.as_str()),
        },
        JsonValue::Array(items) => Value::from(
            items
                .iter()
                .map(|item| schema_value(schema, node.items, item))
                .collect::<Vec<_>>(),
        ),
        JsonValue::Object(fields) => {
            let entries: BTreeMap<Value, Value> = fields
                .iter()
                .map(|(k, v)| {
                    let child = node
                        .properties
                        .get(k)
                        .copied()
                        .or(node.additional_properties);
                    (Value::from(k.as_str()), schema_value(schema, child, v))
                })
                .collect();
            Value::from(entries)
        }
    }
}
