// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::CompileError;
use crate::schema::Schema;
use crate::types::*;
use crate::value::Value;

use serde_json::json;

fn schema(doc: serde_json::Value) -> Schema {
    Schema::from_json(&doc).unwrap()
}

#[test]
fn scalars_and_formats() {
    let s = schema(json!({
        "type": "object",
        "properties": {
            "count": {"type": "integer"},
            "ratio": {"type": "number"},
            "enabled": {"type": "boolean"},
            "raw": {"type": "string", "format": "binary"},
            "encoded": {"type": "string", "format": "byte"},
            "timeout": {"type": "string", "format": "duration"},
            "created": {"type": "string", "format": "date-time"},
            "day": {"type": "string", "format": "date"},
        }
    }));
    let DeclType::Object(obj) = decl_type_for(&s, s.root()).unwrap() else {
        panic!("expected object type");
    };
    assert_eq!(obj.name, "Object");
    let ty = |name: &str| obj.field(name).unwrap().ty.clone();
    assert_eq!(ty("count"), DeclType::INT);
    assert_eq!(ty("ratio"), DeclType::DOUBLE);
    assert_eq!(ty("enabled"), DeclType::BOOL);
    assert_eq!(ty("raw"), DeclType::BYTES);
    assert_eq!(ty("encoded"), DeclType::STRING);
    assert_eq!(ty("timeout"), DeclType::DURATION);
    assert_eq!(ty("created"), DeclType::TIMESTAMP);
    assert_eq!(ty("day"), DeclType::TIMESTAMP);
}

#[test]
fn collections_and_escaped_fields() {
    let s = schema(json!({
        "type": "object",
        "properties": {
            "spec": {
                "type": "object",
                "properties": {
                    "x-count": {"type": "integer"},
                    "items": {"type": "array", "items": {"type": "string"}},
                    "labels": {"type": "object", "additionalProperties": {"type": "string"}}
                }
            }
        }
    }));
    let DeclType::Object(root) = decl_type_for(&s, s.root()).unwrap() else {
        panic!("expected object type");
    };
    let DeclType::Object(spec) = &root.field("spec").unwrap().ty else {
        panic!("expected object type");
    };
    assert_eq!(spec.name, "Object.spec");
    let field = spec.field("x__dash__count").unwrap();
    assert_eq!(field.original, "x-count");
    assert_eq!(
        spec.field("items").unwrap().ty,
        DeclType::list(DeclType::STRING)
    );
    assert_eq!(
        spec.field("labels").unwrap().ty,
        DeclType::map(DeclType::STRING, DeclType::STRING)
    );
}

#[test]
fn special_shapes() {
    let s = schema(json!({
        "type": "object",
        "properties": {
            "port": {"x-kubernetes-int-or-string": true},
            "template": {
                "type": "object",
                "x-kubernetes-embedded-resource": true,
                "properties": {
                    "metadata": {"type": "object", "properties": {"labels": {"type": "object"}}}
                }
            }
        }
    }));
    let DeclType::Object(root) = decl_type_for(&s, s.root()).unwrap() else {
        panic!("expected object type");
    };
    let DeclType::Union(port) = &root.field("port").unwrap().ty else {
        panic!("expected union type");
    };
    assert_eq!(port.member("intVal"), Some(&DeclType::INT));
    assert_eq!(port.member("strVal"), Some(&DeclType::STRING));

    let DeclType::Object(template) = &root.field("template").unwrap().ty else {
        panic!("expected object type");
    };
    assert!(template.field("kind").is_some());
    assert!(template.field("apiVersion").is_some());
    let DeclType::Object(metadata) = &template.field("metadata").unwrap().ty else {
        panic!("expected object type");
    };
    assert!(metadata.field("name").is_some());
    assert!(metadata.field("generateName").is_some());
    assert!(metadata.field("labels").is_none());
}

#[test]
fn resource_root_exposes_type_meta() {
    let s = schema(json!({"type": "object", "properties": {"spec": {"type": "object"}}}));
    let DeclType::Object(root) = resource_decl_type_for(&s, s.root()).unwrap() else {
        panic!("expected object type");
    };
    assert!(root.field("spec").is_some());
    assert!(root.field("kind").is_some());
    assert!(root.field("metadata").is_some());
}

#[test]
fn failures_are_typed() {
    let s = schema(json!({"type": "object", "properties": {"bad name": {"type": "string"}}}));
    assert_eq!(
        decl_type_for(&s, s.root()),
        Err(CompileError::Escape {
            name: "bad name".to_string()
        })
    );

    let s = schema(json!({
        "$ref": "#/definitions/Node",
        "definitions": {
            "Node": {"type": "object", "properties": {"next": {"$ref": "#/definitions/Node"}}}
        }
    }));
    assert!(matches!(
        decl_type_for(&s, s.root()),
        Err(CompileError::CyclicType { .. })
    ));
}

#[test]
fn schema_guided_values() {
    let s = schema(json!({
        "type": "object",
        "properties": {
            "ratio": {"type": "number"},
            "timeout": {"type": "string", "format": "duration"},
            "created": {"type": "string", "format": "date-time"}
        }
    }));
    let value = schema_value(
        &s,
        Some(s.root()),
        &json!({"ratio": 2, "timeout": "1m30s", "created": "2024-01-02T03:04:05Z", "other": 1}),
    );
    assert!(matches!(value.field("ratio"), Some(Value::Double(d)) if *d == 2.0));
    assert!(matches!(value.field("timeout"), Some(Value::Duration(d)) if d.num_seconds() == 90));
    assert!(matches!(value.field("created"), Some(Value::Timestamp(_))));
    assert!(matches!(value.field("other"), Some(Value::Int(1))));
}
