// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The admission request seen by matchers and expressions.

use crate::types::{DeclType, ObjectType};
use crate::value::Value;

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group.as_str() {
            "" => write!(f, "{}, Kind={}", self.version, self.kind),
            g => write!(f, "{g}/{}, Kind={}", self.version, self.kind),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn is_namespaces(&self) -> bool {
        self.group.is_empty() && self.version == "v1" && self.resource == "namespaces"
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Resource={}", self.group, self.version, self.resource)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub username: String,
    pub uid: String,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    #[default]
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admission request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    pub sub_resource: String,
    /// Kind of the original request when it was converted before admission.
    pub request_kind: Option<GroupVersionKind>,
    pub request_resource: Option<GroupVersionResource>,
    pub request_sub_resource: Option<String>,
    pub name: String,
    pub namespace: String,
    pub operation: Operation,
    pub user_info: UserInfo,
    pub dry_run: bool,
    pub options: Option<serde_json::Value>,
    pub object: Option<serde_json::Value>,
    pub old_object: Option<serde_json::Value>,
}

/// Labels of `object`. An object with metadata but no labels has an empty label set; only an
/// object without metadata has none.
pub(crate) fn labels_of(object: Option<&serde_json::Value>) -> Option<BTreeMap<String, String>> {
    let metadata = object?.get("metadata")?.as_object()?;
    let labels = match metadata.get("labels").and_then(|l| l.as_object()) {
        Some(labels) => labels
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
            .collect(),
        None => BTreeMap::new(),
    };
    Some(labels)
}

impl AdmissionRequest {
    /// Labels of the new object, or `None` when the object carries no metadata.
    pub fn object_labels(&self) -> Option<BTreeMap<String, String>> {
        labels_of(self.object.as_ref())
    }

    pub fn old_object_labels(&self) -> Option<BTreeMap<String, String>> {
        labels_of(self.old_object.as_ref())
    }

    /// The `request` variable. Objects are exposed through `object` and `oldObject` instead.
    pub fn to_value(&self) -> Value {
        let gvk = |k: &GroupVersionKind| {
            string_map([
                ("group", k.group.as_str()),
                ("version", k.version.as_str()),
                ("kind", k.kind.as_str()),
            ])
        };
        let gvr = |r: &GroupVersionResource| {
            string_map([
                ("group", r.group.as_str()),
                ("version", r.version.as_str()),
                ("resource", r.resource.as_str()),
            ])
        };
        let mut m = BTreeMap::new();
        let mut put = |k: &str, v: Value| {
            m.insert(Value::from(k), v);
        };
        put("uid", Value::from(self.uid.as_str()));
        put("kind", gvk(&self.kind));
        put("resource", gvr(&self.resource));
        put("subResource", Value::from(self.sub_resource.as_str()));
        put(
            "requestKind",
            gvk(self.request_kind.as_ref().unwrap_or(&self.kind)),
        );
        put(
            "requestResource",
            gvr(self.request_resource.as_ref().unwrap_or(&self.resource)),
        );
        put(
            "requestSubResource",
            Value::from(
                self.request_sub_resource
                    .as_deref()
                    .unwrap_or(&self.sub_resource),
            ),
        );
        put("name", Value::from(self.name.as_str()));
        put("namespace", Value::from(self.namespace.as_str()));
        put("operation", Value::from(self.operation.as_str()));
        put("userInfo", user_info_value(&self.user_info));
        put("dryRun", Value::Bool(self.dry_run));
        put(
            "options",
            self.options.as_ref().map_or(Value::Null, Value::from_json),
        );
        Value::Map(Arc::new(m))
    }
}

fn string_map<const N: usize>(entries: [(&str, &str); N]) -> Value {
    Value::from(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), Value::from(v)))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn user_info_value(user: &UserInfo) -> Value {
    let strings = |items: &[String]| {
        Value::from(
            items
                .iter()
                .map(|s| Value::from(s.as_str()))
                .collect::<Vec<_>>(),
        )
    };
    let extra: BTreeMap<Value, Value> = user
        .extra
        .iter()
        .map(|(k, v)| (Value::from(k.as_str()), strings(v)))
        .collect();
    let mut m = BTreeMap::new();
    m.insert(Value::from("username"), Value::from(user.username.as_str()));
    m.insert(Value::from("uid"), Value::from(user.uid.as_str()));
    m.insert(Value::from("groups"), strings(&user.groups));
    m.insert(Value::from("extra"), Value::from(extra));
    Value::from(m)
}

/// Declared type of the `request` variable.
pub fn request_decl_type() -> DeclType {
    let gvk = DeclType::object(
        ObjectType::new("kubernetes.GroupVersionKind")
            .with_field("group", DeclType::STRING)
            .with_field("version", DeclType::STRING)
            .with_field("kind", DeclType::STRING),
    );
    let gvr = DeclType::object(
        ObjectType::new("kubernetes.GroupVersionResource")
            .with_field("group", DeclType::STRING)
            .with_field("version", DeclType::STRING)
            .with_field("resource", DeclType::STRING),
    );
    let user_info = DeclType::object(
        ObjectType::new("kubernetes.UserInfo")
            .with_field("username", DeclType::STRING)
            .with_field("uid", DeclType::STRING)
            .with_field("groups", DeclType::list(DeclType::STRING))
            .with_field(
                "extra",
                DeclType::map(DeclType::STRING, DeclType::list(DeclType::STRING)),
            ),
    );
    DeclType::object(
        ObjectType::new("kubernetes.AdmissionRequest")
            .with_field("uid", DeclType::STRING)
            .with_field("kind", gvk.clone())
            .with_field("resource", gvr.clone())
            .with_field("subResource", DeclType::STRING)
            .with_field("requestKind", gvk)
            .with_field("requestResource", gvr)
            .with_field("requestSubResource", DeclType::STRING)
            .with_field("name", DeclType::STRING)
            .with_field("namespace", DeclType::STRING)
            .with_field("operation", DeclType::STRING)
            .with_field("userInfo", user_info)
            .with_field("dryRun", DeclType::BOOL)
            .with_field("options", DeclType::DYN),
    )
}
