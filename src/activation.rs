// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Name resolution for one evaluation call.
//!
//! A name that is not bound resolves to `None`, which is distinct from a bound `null`. This is
//! how `oldSelf` stays absent on create operations.

use crate::value::Value;

use std::collections::BTreeMap;
use std::sync::Arc;

pub const SELF_VAR: &str = "self";
pub const OLD_SELF_VAR: &str = "oldSelf";
pub const REQUEST_VAR: &str = "request";
pub const PARAMS_VAR: &str = "params";
pub const AUTHORIZER_VAR: &str = "authorizer";
pub const NAMESPACE_VAR: &str = "namespaceObject";
pub const VARIABLES_VAR: &str = "variables";
pub const OBJECT_VAR: &str = "object";
pub const OLD_OBJECT_VAR: &str = "oldObject";

pub trait Activation {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// Fixed set of bindings.
#[derive(Debug, Clone, Default)]
pub struct MapActivation {
    vars: BTreeMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    /// Binds `value` only when present.
    pub fn with_opt(self, name: &str, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}

/// Bindings of one validator node layered over the per-call context.
///
/// Built once per node and shared by every rule at that node.
pub struct NodeActivation<'a> {
    self_value: Value,
    old_self: Option<Value>,
    /// Escaped field names of `self` bound as variables, mapped to property names.
    siblings: &'a BTreeMap<String, String>,
    parent: &'a dyn Activation,
}

impl<'a> NodeActivation<'a> {
    pub fn new(
        self_value: Value,
        old_self: Option<Value>,
        siblings: &'a BTreeMap<String, String>,
        parent: &'a dyn Activation,
    ) -> Self {
        Self {
            self_value,
            old_self,
            siblings,
            parent,
        }
    }
}

impl Activation for NodeActivation<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        match name {
            SELF_VAR => Some(self.self_value.clone()),
            OLD_SELF_VAR => self.old_self.clone(),
            _ => match self.siblings.get(name) {
                Some(property) => self.self_value.field(property).cloned(),
                None => self.parent.resolve(name),
            },
        }
    }
}

/// Context values shared by every node of one validation or mutation call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub request: Option<Value>,
    pub params: Option<Value>,
    pub authorizer: Option<Value>,
    pub namespace_object: Option<Value>,
    pub variables: Option<Arc<BTreeMap<Value, Value>>>,
}

impl CallContext {
    pub fn activation(&self) -> MapActivation {
        MapActivation::new()
            .with_opt(REQUEST_VAR, self.request.clone())
            // Absent params and namespace objects are bound as null so that expressions can
            // test for them with `params == null`.
            .with(PARAMS_VAR, self.params.clone().unwrap_or(Value::Null))
            .with(
                NAMESPACE_VAR,
                self.namespace_object.clone().unwrap_or(Value::Null),
            )
            .with_opt(AUTHORIZER_VAR, self.authorizer.clone())
            .with_opt(VARIABLES_VAR, self.variables.clone().map(Value::Map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_bindings_shadow_context() {
        let context = MapActivation::new()
            .with(SELF_VAR, Value::from("outer"))
            .with(PARAMS_VAR, Value::Int(1));
        let mut fields = BTreeMap::new();
        fields.insert(Value::from("x-y"), Value::Int(7));
        let value = Value::from(fields);
        let siblings = [("x__dash__y".to_string(), "x-y".to_string())]
            .into_iter()
            .collect();

        let node = NodeActivation::new(value.clone(), None, &siblings, &context);
        assert_eq!(node.resolve(SELF_VAR), Some(value));
        assert_eq!(node.resolve(OLD_SELF_VAR), None);
        assert_eq!(node.resolve("x__dash__y"), Some(Value::Int(7)));
        assert_eq!(node.resolve(PARAMS_VAR), Some(Value::Int(1)));
        assert_eq!(node.resolve("missing"), None);
    }

    #[test]
    fn context_binds_null_params() {
        let activation = CallContext::default().activation();
        assert_eq!(activation.resolve(PARAMS_VAR), Some(Value::Null));
        assert_eq!(activation.resolve(AUTHORIZER_VAR), None);
    }
}
