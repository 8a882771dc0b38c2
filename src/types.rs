// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declared types of expression variables, derived from structural schemas.

mod convert;
mod escaping;
mod provider;

#[cfg(test)]
mod tests;

pub use convert::{object_value, schema_value};
pub use escaping::{escape, is_root_reserved, unescape};
pub use provider::{decl_type_for, resource_decl_type_for, ROOT_TYPE_NAME};

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    Dyn,
}

/// Types whose values are only used through functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueType {
    Authorizer,
    ResourceCheck,
    Decision,
    Ip,
    Cidr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclField {
    /// Escaped name as written in expressions.
    pub name: String,
    /// Property name as it appears in the data.
    pub original: String,
    pub ty: DeclType,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub name: String,
    pub fields: BTreeMap<String, DeclField>,
    /// Unknown fields may be selected and are typed `dyn`.
    pub open: bool,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            open: false,
        }
    }

    pub fn with_field(mut self, name: &str, ty: DeclType) -> Self {
        self.fields.insert(
            name.to_string(),
            DeclField {
                name: name.to_string(),
                original: name.to_string(),
                ty,
                required: false,
            },
        );
        self
    }

    pub fn field(&self, name: &str) -> Option<&DeclField> {
        self.fields.get(name)
    }
}

/// A union whose members are selected by accessor fields, such as int-or-string.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub name: String,
    pub members: Vec<(String, DeclType)>,
}

impl UnionType {
    pub fn int_or_string() -> Self {
        Self {
            name: "intOrString".to_string(),
            members: vec![
                ("intVal".to_string(), DeclType::INT),
                ("strVal".to_string(), DeclType::STRING),
            ],
        }
    }

    pub fn member(&self, name: &str) -> Option<&DeclType> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, ty)| ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclType {
    Scalar(ScalarType),
    List(Arc<DeclType>),
    Map(Arc<DeclType>, Arc<DeclType>),
    Object(Arc<ObjectType>),
    Union(Arc<UnionType>),
    Opaque(OpaqueType),
}

impl DeclType {
    pub const NULL: DeclType = DeclType::Scalar(ScalarType::Null);
    pub const BOOL: DeclType = DeclType::Scalar(ScalarType::Bool);
    pub const INT: DeclType = DeclType::Scalar(ScalarType::Int);
    pub const UINT: DeclType = DeclType::Scalar(ScalarType::Uint);
    pub const DOUBLE: DeclType = DeclType::Scalar(ScalarType::Double);
    pub const STRING: DeclType = DeclType::Scalar(ScalarType::String);
    pub const BYTES: DeclType = DeclType::Scalar(ScalarType::Bytes);
    pub const DURATION: DeclType = DeclType::Scalar(ScalarType::Duration);
    pub const TIMESTAMP: DeclType = DeclType::Scalar(ScalarType::Timestamp);
    pub const DYN: DeclType = DeclType::Scalar(ScalarType::Dyn);

    pub fn list(elem: DeclType) -> Self {
        DeclType::List(Arc::new(elem))
    }

    pub fn map(key: DeclType, value: DeclType) -> Self {
        DeclType::Map(Arc::new(key), Arc::new(value))
    }

    pub fn object(object: ObjectType) -> Self {
        DeclType::Object(Arc::new(object))
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, DeclType::Scalar(ScalarType::Dyn))
    }

    /// Union types behave as `dyn` outside of member selection.
    pub fn is_dyn_like(&self) -> bool {
        matches!(self, DeclType::Scalar(ScalarType::Dyn) | DeclType::Union(_))
    }

    pub fn is_scalar(&self, scalar: ScalarType) -> bool {
        matches!(self, DeclType::Scalar(s) if *s == scalar)
    }

    /// Returns true if a value of type `other` may be used where `self` is expected.
    pub fn is_assignable_from(&self, other: &DeclType) -> bool {
        if self.is_dyn_like() || other.is_dyn_like() {
            return true;
        }
        match (self, other) {
            (DeclType::Scalar(a), DeclType::Scalar(b)) => a == b,
            (DeclType::List(a), DeclType::List(b)) => a.is_assignable_from(b),
            (DeclType::Map(ak, av), DeclType::Map(bk, bv)) => {
                ak.is_assignable_from(bk) && av.is_assignable_from(bv)
            }
            (DeclType::Object(a), DeclType::Object(b)) => a.name == b.name,
            (DeclType::Opaque(a), DeclType::Opaque(b)) => a == b,
            _ => false,
        }
    }

    /// Common type of two branches, `dyn` when they disagree.
    pub fn join(&self, other: &DeclType) -> DeclType {
        if self == other {
            self.clone()
        } else if self.is_scalar(ScalarType::Null) {
            other.clone()
        } else if other.is_scalar(ScalarType::Null) {
            self.clone()
        } else {
            DeclType::DYN
        }
    }
}

impl fmt::Display for DeclType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclType::Scalar(s) => f.write_str(match s {
                ScalarType::Null => "null_type",
                ScalarType::Bool => "bool",
                ScalarType::Int => "int",
                ScalarType::Uint => "uint",
                ScalarType::Double => "double",
                ScalarType::String => "string",
                ScalarType::Bytes => "bytes",
                ScalarType::Duration => "google.protobuf.Duration",
                ScalarType::Timestamp => "google.protobuf.Timestamp",
                ScalarType::Dyn => "dyn",
            }),
            DeclType::List(elem) => write!(f, "list({elem})"),
            DeclType::Map(k, v) => write!(f, "map({k}, {v})"),
            DeclType::Object(o) => f.write_str(&o.name),
            DeclType::Union(u) => f.write_str(&u.name),
            DeclType::Opaque(o) => f.write_str(match o {
                OpaqueType::Authorizer => "kubernetes.authorization.Authorizer",
                OpaqueType::ResourceCheck => "kubernetes.authorization.ResourceCheck",
                OpaqueType::Decision => "kubernetes.authorization.Decision",
                OpaqueType::Ip => "kubernetes.IP",
                OpaqueType::Cidr => "kubernetes.CIDR",
            }),
        }
    }
}
