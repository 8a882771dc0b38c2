// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt;
use core::net::IpAddr;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use data_encoding::BASE64;
use ipnet::IpNet;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::builtins::authz::AuthzValue;
use crate::builtins::time::format_duration;
use crate::error::EvalError;

/// A record value produced from an object literal such as `Object.spec{replicas: 3}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectValue {
    pub type_name: Arc<str>,
    pub fields: BTreeMap<Arc<str>, Value>,
}

/// Runtime value of an expression.
///
/// Containers are reference counted so that bindings and intermediate results can be shared
/// between rules without copying.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Duration(Duration),
    Timestamp(DateTime<Utc>),
    List(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<Value, Value>>),
    Object(Arc<ObjectValue>),
    Authz(Arc<AuthzValue>),
    Ip(IpAddr),
    Cidr(IpNet),
}

impl Value {
    pub fn new_list() -> Self {
        Value::List(Arc::new(Vec::new()))
    }

    pub fn new_map() -> Self {
        Value::Map(Arc::new(BTreeMap::new()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Duration(_) => "google.protobuf.Duration",
            Value::Timestamp(_) => "google.protobuf.Timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Authz(_) => "authorizer",
            Value::Ip(_) => "kubernetes.IP",
            Value::Cidr(_) => "kubernetes.CIDR",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Looks up a field on a map or object value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(&Value::from(name)),
            Value::Object(o) => o.fields.get(name),
            _ => None,
        }
    }

    /// Converts a JSON document without schema guidance.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::from(items.iter().map(Value::from_json).collect::<Vec<_>>())
            }
            serde_json::Value::Object(fields) => Value::Map(Arc::new(
                fields
                    .iter()
                    .map(|(k, v)| (Value::from(k.as_str()), Value::from_json(v)))
                    .collect(),
            )),
        }
    }

    /// Converts the value back into a JSON document.
    pub fn to_json(&self) -> Result<serde_json::Value, EvalError> {
        serde_json::to_value(self).map_err(|e| EvalError::InvalidArgument(e.to_string()))
    }

    /// Approximate size used for size-proportional cost accounting.
    pub fn size(&self) -> usize {
        match self {
            Value::String(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::List(l) => l.len(),
            Value::Map(m) => m.len(),
            Value::Object(o) => o.fields.len(),
            _ => 1,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Uint(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Duration(_) => 5,
            Value::Timestamp(_) => 6,
            Value::List(_) => 7,
            Value::Map(_) => 8,
            Value::Object(_) => 9,
            Value::Authz(_) => 10,
            Value::Ip(_) => 11,
            Value::Cidr(_) => 12,
        }
    }
}

// NaN sorts after every other double so that maps keyed by doubles stay well formed.
fn cmp_f64(x: f64, y: f64) -> Ordering {
    match x.partial_cmp(&y) {
        Some(o) => o,
        None => x.is_nan().cmp(&y.is_nan()),
    }
}

fn cmp_int_uint(x: i64, y: u64) -> Ordering {
    if x < 0 {
        Ordering::Less
    } else {
        (x as u64).cmp(&y)
    }
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Uint(x), Value::Uint(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => cmp_f64(*x, *y),
        (Value::Int(x), Value::Uint(y)) => cmp_int_uint(*x, *y),
        (Value::Uint(x), Value::Int(y)) => cmp_int_uint(*y, *x).reverse(),
        (Value::Int(x), Value::Double(y)) => cmp_f64(*x as f64, *y),
        (Value::Double(x), Value::Int(y)) => cmp_f64(*x, *y as f64),
        (Value::Uint(x), Value::Double(y)) => cmp_f64(*x as f64, *y),
        (Value::Double(x), Value::Uint(y)) => cmp_f64(*x, *y as f64),
        _ => a.rank().cmp(&b.rank()),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
            (Value::Duration(x), Value::Duration(y)) => x.cmp(y),
            (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
            (Value::List(x), Value::List(y)) => x.cmp(y),
            (Value::Map(x), Value::Map(y)) => x.cmp(y),
            (Value::Object(x), Value::Object(y)) => x.cmp(y),
            (Value::Authz(x), Value::Authz(y)) => Arc::as_ptr(x).cmp(&Arc::as_ptr(y)),
            (Value::Ip(x), Value::Ip(y)) => x.cmp(y),
            (Value::Cidr(x), Value::Cidr(y)) => x.cmp(y),
            _ if self.rank() == 2 && other.rank() == 2 => cmp_numbers(self, other),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Uint(u) => serializer.serialize_u64(*u),
            Value::Double(d) if d.is_finite() => serializer.serialize_f64(*d),
            Value::Double(d) => Err(S::Error::custom(format!("{d} cannot be represented in JSON"))),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&BASE64.encode(b)),
            Value::Duration(d) => serializer.serialize_str(&format_duration(d)),
            Value::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Object(obj) => {
                let mut map = serializer.serialize_map(Some(obj.fields.len()))?;
                for (k, v) in obj.fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
            Value::Authz(_) => Err(S::Error::custom("authorizer values cannot be serialized")),
            Value::Ip(ip) => serializer.collect_str(ip),
            Value::Cidr(cidr) => serializer.collect_str(cidr),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}u"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::String(s) => write!(f, "{:?}", s.as_ref()),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Duration(d) => write!(f, "duration({:?})", format_duration(d)),
            Value::Timestamp(t) => write!(
                f,
                "timestamp({:?})",
                t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => {
                write!(f, "{}{{", obj.type_name)?;
                for (idx, (k, v)) in obj.fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Authz(_) => f.write_str("authorizer"),
            Value::Ip(ip) => write!(f, "ip({:?})", ip.to_string()),
            Value::Cidr(cidr) => write!(f, "cidr({:?})", cidr.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(entries: BTreeMap<Value, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}
