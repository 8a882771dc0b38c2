// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structural schemas stored as an arena of nodes.
//!
//! Nodes refer to each other by [`NodeId`], so self-referential schemas (via `$ref`) are
//! representable without reference cycles. Consumers that walk the graph must detect cycles.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FieldErrorKind, SchemaError};

/// Index of a node within a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Object,
    Array,
    Map,
    String,
    Number,
    Integer,
    Boolean,
    Null,
    /// No declared type (int-or-string, preserve-unknown-fields).
    Any,
}

/// How list elements correlate between an old and a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListType {
    #[default]
    Atomic,
    Set,
    Map(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapType {
    #[default]
    Granular,
    Atomic,
}

/// Structured failure reason attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    FieldValueInvalid,
    FieldValueForbidden,
    FieldValueRequired,
    FieldValueDuplicate,
}

impl FailureReason {
    pub fn kind(&self) -> FieldErrorKind {
        match self {
            Self::FieldValueInvalid => FieldErrorKind::Invalid,
            Self::FieldValueForbidden => FieldErrorKind::Forbidden,
            Self::FieldValueRequired => FieldErrorKind::Required,
            Self::FieldValueDuplicate => FieldErrorKind::Duplicate,
        }
    }
}

/// A validation rule attached to a schema node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Rule {
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Relative path, such as `.spec.replicas`, at which failures are reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
}

impl Rule {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_message_expression(mut self, expr: impl Into<String>) -> Self {
        self.message_expression = Some(expr.into());
        self
    }
}

/// Budget-free value constraints checked before rules.
#[derive(Debug, Clone, Default)]
pub struct ValueValidations {
    pub enum_values: Vec<serde_json::Value>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    pub pattern: Option<Regex>,
    pub required: Vec<String>,
}

impl ValueValidations {
    pub fn is_empty(&self) -> bool {
        self.enum_values.is_empty()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min_items.is_none()
            && self.max_items.is_none()
            && self.min_properties.is_none()
            && self.max_properties.is_none()
            && self.pattern.is_none()
            && self.required.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: Kind,
    pub format: Option<String>,
    pub nullable: bool,
    pub properties: BTreeMap<String, NodeId>,
    pub items: Option<NodeId>,
    pub additional_properties: Option<NodeId>,
    pub list_type: ListType,
    pub map_type: MapType,
    pub int_or_string: bool,
    pub embedded_resource: bool,
    pub preserve_unknown_fields: bool,
    pub validations: ValueValidations,
    pub rules: Vec<Rule>,
}

impl SchemaNode {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            format: None,
            nullable: false,
            properties: BTreeMap::new(),
            items: None,
            additional_properties: None,
            list_type: ListType::default(),
            map_type: MapType::default(),
            int_or_string: false,
            embedded_resource: false,
            preserve_unknown_fields: false,
            validations: ValueValidations::default(),
            rules: vec![],
        }
    }
}

/// An immutable schema graph.
#[derive(Debug, Clone)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    root: NodeId,
}

impl Schema {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_value(json.clone())?;
        let mut builder = ArenaBuilder {
            nodes: vec![],
            definitions: &raw.definitions,
            resolved: BTreeMap::new(),
        };
        let root = builder.add(&raw, "")?;
        Ok(Self {
            nodes: builder.nodes,
            root,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value =
            serde_yaml::from_str(yaml).map_err(|e| SchemaError::Invalid {
                path: "".to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(&value)
    }

    /// Returns the node reached by following object properties.
    pub fn lookup(&self, path: &[&str]) -> Option<NodeId> {
        let mut id = self.root;
        for name in path {
            id = *self.node(id).properties.get(*name)?;
        }
        Some(id)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum AdditionalProperties {
    #[default]
    Absent,
    Allowed(bool),
    Schema(Box<RawSchema>),
}

// Descriptive keywords are accepted so real schemas decode, but are not used.
#[allow(dead_code)]
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct RawSchema {
    #[serde(rename = "type")]
    ty: Option<String>,
    format: Option<String>,
    description: Option<String>,
    title: Option<String>,
    default: Option<serde_json::Value>,
    example: Option<serde_json::Value>,
    nullable: bool,
    #[serde(rename = "enum")]
    enum_values: Vec<serde_json::Value>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: bool,
    exclusive_maximum: bool,
    multiple_of: Option<f64>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    min_items: Option<u64>,
    max_items: Option<u64>,
    unique_items: bool,
    min_properties: Option<u64>,
    max_properties: Option<u64>,
    pattern: Option<String>,
    required: Vec<String>,
    properties: BTreeMap<String, RawSchema>,
    items: Option<Box<RawSchema>>,
    additional_properties: AdditionalProperties,
    #[serde(rename = "$ref")]
    reference: Option<String>,
    definitions: BTreeMap<String, RawSchema>,
    #[serde(rename = "x-kubernetes-int-or-string")]
    int_or_string: bool,
    #[serde(rename = "x-kubernetes-embedded-resource")]
    embedded_resource: bool,
    #[serde(rename = "x-kubernetes-preserve-unknown-fields")]
    preserve_unknown_fields: bool,
    #[serde(rename = "x-kubernetes-list-type")]
    list_type: Option<String>,
    #[serde(rename = "x-kubernetes-list-map-keys")]
    list_map_keys: Vec<String>,
    #[serde(rename = "x-kubernetes-map-type")]
    map_type: Option<String>,
    #[serde(rename = "x-kubernetes-validations")]
    validations: Vec<Rule>,
}

struct ArenaBuilder<'a> {
    nodes: Vec<SchemaNode>,
    definitions: &'a BTreeMap<String, RawSchema>,
    resolved: BTreeMap<String, NodeId>,
}

impl ArenaBuilder<'_> {
    fn alloc(&mut self) -> NodeId {
        self.nodes.push(SchemaNode::new(Kind::Any));
        NodeId(self.nodes.len() - 1)
    }

    fn add(&mut self, raw: &RawSchema, path: &str) -> Result<NodeId, SchemaError> {
        if let Some(reference) = &raw.reference {
            return self.resolve(reference);
        }
        let id = self.alloc();
        self.fill(id, raw, path)?;
        Ok(id)
    }

    fn resolve(&mut self, reference: &str) -> Result<NodeId, SchemaError> {
        let definitions = self.definitions;
        let mut aliases = BTreeSet::new();
        let mut reference = reference;
        loop {
            let name = reference
                .strip_prefix("#/definitions/")
                .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))?;
            if let Some(id) = self.resolved.get(name) {
                return Ok(*id);
            }
            let raw = definitions
                .get(name)
                .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))?;
            let Some(inner) = &raw.reference else {
                // Registered before filling so that recursive references resolve to this node.
                let id = self.alloc();
                self.resolved.insert(name.to_string(), id);
                self.fill(id, raw, &format!("definitions.{name}"))?;
                return Ok(id);
            };
            // A definition that only refers to another one has no node of its own.
            if !aliases.insert(name) {
                return Err(SchemaError::Invalid {
                    path: format!("definitions.{name}"),
                    reason: "reference cycle without a schema".to_string(),
                });
            }
            reference = inner;
        }
    }

    fn fill(&mut self, id: NodeId, raw: &RawSchema, path: &str) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::Invalid {
            path: if path.is_empty() {
                "<root>".to_string()
            } else {
                path.to_string()
            },
            reason,
        };

        let mut properties = BTreeMap::new();
        for (name, child) in &raw.properties {
            let child_path = join(path, "properties", name);
            properties.insert(name.clone(), self.add(child, &child_path)?);
        }
        let items = match &raw.items {
            Some(child) => Some(self.add(child, &join(path, "items", ""))?),
            None => None,
        };
        let additional_properties = match &raw.additional_properties {
            AdditionalProperties::Schema(child) => {
                Some(self.add(child, &join(path, "additionalProperties", ""))?)
            }
            AdditionalProperties::Allowed(true) => {
                let any = self.alloc();
                Some(any)
            }
            AdditionalProperties::Allowed(false) | AdditionalProperties::Absent => None,
        };

        let kind = match raw.ty.as_deref() {
            Some("object") if additional_properties.is_some() && properties.is_empty() => {
                Kind::Map
            }
            Some("object") => Kind::Object,
            Some("array") => Kind::Array,
            Some("string") => Kind::String,
            Some("number") => Kind::Number,
            Some("integer") => Kind::Integer,
            Some("boolean") => Kind::Boolean,
            Some("null") => Kind::Null,
            None | Some("") => Kind::Any,
            Some(other) => return Err(SchemaError::UnsupportedType(other.to_string())),
        };

        let list_type = match raw.list_type.as_deref() {
            None | Some("atomic") => ListType::Atomic,
            Some("set") => ListType::Set,
            Some("map") if raw.list_map_keys.is_empty() => {
                return Err(invalid(
                    "x-kubernetes-list-map-keys must be set for list type map".to_string(),
                ))
            }
            Some("map") => ListType::Map(raw.list_map_keys.clone()),
            Some(other) => return Err(invalid(format!("unknown list type `{other}`"))),
        };
        let map_type = match raw.map_type.as_deref() {
            None | Some("granular") => MapType::Granular,
            Some("atomic") => MapType::Atomic,
            Some(other) => return Err(invalid(format!("unknown map type `{other}`"))),
        };

        let pattern = match &raw.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| invalid(e.to_string()))?),
            None => None,
        };

        let node = SchemaNode {
            kind,
            format: raw.format.clone(),
            nullable: raw.nullable,
            properties,
            items,
            additional_properties,
            list_type,
            map_type,
            int_or_string: raw.int_or_string,
            embedded_resource: raw.embedded_resource,
            preserve_unknown_fields: raw.preserve_unknown_fields,
            validations: ValueValidations {
                enum_values: raw.enum_values.clone(),
                minimum: raw.minimum,
                maximum: raw.maximum,
                exclusive_minimum: raw.exclusive_minimum,
                exclusive_maximum: raw.exclusive_maximum,
                min_length: raw.min_length,
                max_length: raw.max_length,
                min_items: raw.min_items,
                max_items: raw.max_items,
                min_properties: raw.min_properties,
                max_properties: raw.max_properties,
                pattern,
                required: raw.required.clone(),
            },
            rules: raw.validations.clone(),
        };
        if let Some(slot) = self.nodes.get_mut(id.0) {
            *slot = node;
        }
        Ok(())
    }
}

fn join(path: &str, segment: &str, name: &str) -> String {
    let mut out = String::with_capacity(path.len() + segment.len() + name.len() + 2);
    out.push_str(path);
    if !out.is_empty() {
        out.push('.');
    }
    out.push_str(segment);
    if !name.is_empty() {
        out.push('.');
        out.push_str(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_kubernetes_extensions() {
        let schema = Schema::from_json(&json!({
            "type": "object",
            "properties": {
                "ports": {
                    "type": "array",
                    "x-kubernetes-list-type": "map",
                    "x-kubernetes-list-map-keys": ["name"],
                    "items": {"type": "object", "properties": {"name": {"type": "string"}}}
                },
                "labels": {"type": "object", "additionalProperties": {"type": "string"}},
                "port": {"x-kubernetes-int-or-string": true}
            },
            "x-kubernetes-validations": [{"rule": "true", "message": "ok"}]
        }))
        .unwrap();

        let root = schema.node(schema.root());
        assert_eq!(root.kind, Kind::Object);
        assert_eq!(root.rules.len(), 1);
        let ports = schema.node(root.properties["ports"]);
        assert_eq!(ports.list_type, ListType::Map(vec!["name".to_string()]));
        assert_eq!(schema.node(root.properties["labels"]).kind, Kind::Map);
        assert!(schema.node(root.properties["port"]).int_or_string);
    }

    #[test]
    fn recursive_references_share_nodes() {
        let schema = Schema::from_json(&json!({
            "$ref": "#/definitions/Node",
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": {"child": {"$ref": "#/definitions/Node"}}
                }
            }
        }))
        .unwrap();
        let root = schema.root();
        assert_eq!(schema.node(root).properties["child"], root);
    }

    #[test]
    fn reference_alias_cycles_are_rejected() {
        let result = Schema::from_json(&json!({
            "$ref": "#/definitions/A",
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        }));
        assert!(matches!(result, Err(SchemaError::Invalid { .. })));

        let result = Schema::from_json(&json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/definitions/Loop"}},
            "definitions": {"Loop": {"$ref": "#/definitions/Loop"}}
        }));
        assert!(matches!(result, Err(SchemaError::Invalid { .. })));

        // Aliases that end in a schema resolve to it.
        let schema = Schema::from_json(&json!({
            "$ref": "#/definitions/Alias",
            "definitions": {
                "Alias": {"$ref": "#/definitions/Node"},
                "Node": {"type": "object", "properties": {"next": {"$ref": "#/definitions/Alias"}}}
            }
        }))
        .unwrap();
        assert_eq!(schema.node(schema.root()).properties["next"], schema.root());
    }

    #[test]
    fn rejects_unknown_fields_and_bad_refs() {
        assert!(Schema::from_json(&json!({"type": "object", "bogus": 1})).is_err());
        assert!(matches!(
            Schema::from_json(&json!({"$ref": "#/definitions/Missing"})),
            Err(SchemaError::UnresolvedRef(_))
        ));
        assert!(matches!(
            Schema::from_json(&json!({"type": "array", "x-kubernetes-list-type": "map"})),
            Err(SchemaError::Invalid { .. })
        ));
    }
}
