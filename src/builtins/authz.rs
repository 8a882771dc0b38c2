// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `authorizer` variable: a capability handle that lets expressions ask the host whether the
//! requesting user may perform some other action.
//!
//! ```text
//! authorizer.group('apps').resource('deployments').namespace('prod').check('delete').allowed()
//! ```

use crate::builtins::utils::{ensure_args_count, ensure_receiver, ensure_string, no_overload};
use crate::builtins::{BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::request::UserInfo;
use crate::types::{DeclType, OpaqueType, ScalarType};
use crate::value::Value;

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed cost charged for every call into the host authorizer.
pub const CHECK_COST: u64 = 350;

/// Attributes of the action being authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationAttributes {
    pub user: UserInfo,
    pub verb: String,
    pub api_group: String,
    pub resource: String,
    pub subresource: String,
    pub namespace: String,
    pub name: String,
    /// Set for non-resource requests such as `/healthz`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    NoOpinion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub decision: Decision,
    pub reason: String,
    pub error: Option<String>,
}

impl AuthorizationDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: String::new(),
            error: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
            error: None,
        }
    }
}

/// Host supplied authorization backend.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, attributes: &AuthorizationAttributes) -> AuthorizationDecision;
}

/// Runtime payload of the authorizer opaque types.
pub enum AuthzValue {
    Authorizer {
        authorizer: Arc<dyn Authorizer>,
        user: UserInfo,
    },
    Check {
        authorizer: Arc<dyn Authorizer>,
        attributes: AuthorizationAttributes,
    },
    Decision(AuthorizationDecision),
}

impl AuthzValue {
    /// Value bound to the `authorizer` variable for a request made by `user`.
    pub fn bind(authorizer: Arc<dyn Authorizer>, user: UserInfo) -> Value {
        Value::Authz(Arc::new(AuthzValue::Authorizer { authorizer, user }))
    }
}

impl fmt::Debug for AuthzValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorizer { user, .. } => f
                .debug_struct("Authorizer")
                .field("user", &user.username)
                .finish_non_exhaustive(),
            Self::Check { attributes, .. } => f
                .debug_struct("Check")
                .field("attributes", attributes)
                .finish_non_exhaustive(),
            Self::Decision(d) => f.debug_tuple("Decision").field(d).finish(),
        }
    }
}

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("group", (Receiver::Required, check_attribute, group));
    m.insert("resource", (Receiver::Required, check_attribute, resource));
    m.insert("subresource", (Receiver::Required, check_attribute, subresource));
    m.insert("namespace", (Receiver::Required, check_attribute, namespace));
    m.insert("name", (Receiver::Required, check_attribute, name));
    m.insert("path", (Receiver::Required, check_path, path));
    m.insert("check", (Receiver::Required, check_check, check));
    m.insert("allowed", (Receiver::Required, check_decision_bool, allowed));
    m.insert("errored", (Receiver::Required, check_decision_bool, errored));
    m.insert("reason", (Receiver::Required, check_decision_string, reason));
    m.insert("error", (Receiver::Required, check_decision_string, error));
}

fn is_opaque(ty: &DeclType, accepted: &[OpaqueType]) -> bool {
    match ty {
        DeclType::Opaque(o) => accepted.contains(o),
        t => t.is_dyn_like(),
    }
}

fn single_string_arg(args: &[DeclType]) -> bool {
    args.len() == 1 && (args[0].is_dyn_like() || args[0].is_scalar(ScalarType::String))
}

fn check_attribute(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let accepted = [OpaqueType::Authorizer, OpaqueType::ResourceCheck];
    (is_opaque(receiver?, &accepted) && single_string_arg(args))
        .then_some(DeclType::Opaque(OpaqueType::ResourceCheck))
}

fn check_path(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (is_opaque(receiver?, &[OpaqueType::Authorizer]) && single_string_arg(args))
        .then_some(DeclType::Opaque(OpaqueType::ResourceCheck))
}

fn check_check(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (is_opaque(receiver?, &[OpaqueType::ResourceCheck]) && single_string_arg(args))
        .then_some(DeclType::Opaque(OpaqueType::Decision))
}

fn check_decision_bool(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (is_opaque(receiver?, &[OpaqueType::Decision]) && args.is_empty()).then_some(DeclType::BOOL)
}

fn check_decision_string(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (is_opaque(receiver?, &[OpaqueType::Decision]) && args.is_empty())
        .then_some(DeclType::STRING)
}

fn authz_receiver<'a>(fcn: &str, r: Option<&'a Value>) -> Result<&'a AuthzValue, EvalError> {
    match ensure_receiver(fcn, r)? {
        Value::Authz(a) => Ok(a),
        v => Err(no_overload(fcn, v)),
    }
}

/// Derives a check from an authorizer or an existing check with one attribute updated.
fn with_attribute(
    fcn: &str,
    r: Option<&Value>,
    args: &[Value],
    set: fn(&mut AuthorizationAttributes, &str),
) -> Result<Value, EvalError> {
    ensure_args_count(fcn, args, 1)?;
    let arg = ensure_string(fcn, &args[0])?;
    let (authorizer, mut attributes) = match authz_receiver(fcn, r)? {
        AuthzValue::Authorizer { authorizer, user } => (
            authorizer.clone(),
            AuthorizationAttributes {
                user: user.clone(),
                ..AuthorizationAttributes::default()
            },
        ),
        AuthzValue::Check {
            authorizer,
            attributes,
        } => (authorizer.clone(), attributes.clone()),
        AuthzValue::Decision(_) => {
            return Err(EvalError::NoSuchOverload(format!(
                "{fcn} applied to kubernetes.authorization.Decision"
            )))
        }
    };
    set(&mut attributes, arg);
    Ok(Value::Authz(Arc::new(AuthzValue::Check {
        authorizer,
        attributes,
    })))
}

fn group(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    with_attribute("group", r, args, |a, v| a.api_group = v.to_string())
}

fn resource(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    with_attribute("resource", r, args, |a, v| a.resource = v.to_string())
}

fn subresource(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    with_attribute("subresource", r, args, |a, v| a.subresource = v.to_string())
}

fn namespace(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    with_attribute("namespace", r, args, |a, v| a.namespace = v.to_string())
}

fn name(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    with_attribute("name", r, args, |a, v| a.name = v.to_string())
}

fn path(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    if !matches!(authz_receiver("path", r)?, AuthzValue::Authorizer { .. }) {
        return Err(EvalError::NoSuchOverload(
            "path applies only to the authorizer".to_string(),
        ));
    }
    with_attribute("path", r, args, |a, v| a.path = Some(v.to_string()))
}

fn check(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let fcn = "check";
    ensure_args_count(fcn, args, 1)?;
    let verb = ensure_string(fcn, &args[0])?;
    let AuthzValue::Check {
        authorizer,
        attributes,
    } = authz_receiver(fcn, r)?
    else {
        return Err(EvalError::NoSuchOverload(format!(
            "{fcn} requires a resource or path check"
        )));
    };
    cost.charge(CHECK_COST)?;
    let attributes = AuthorizationAttributes {
        verb: verb.to_string(),
        ..attributes.clone()
    };
    let decision = authorizer.authorize(&attributes);
    Ok(Value::Authz(Arc::new(AuthzValue::Decision(decision))))
}

fn decision<'a>(fcn: &str, r: Option<&'a Value>) -> Result<&'a AuthorizationDecision, EvalError> {
    match authz_receiver(fcn, r)? {
        AuthzValue::Decision(d) => Ok(d),
        _ => Err(EvalError::NoSuchOverload(format!(
            "{fcn} requires an authorization decision"
        ))),
    }
}

fn allowed(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    ensure_args_count("allowed", args, 0)?;
    Ok(Value::Bool(decision("allowed", r)?.decision == Decision::Allow))
}

fn errored(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    ensure_args_count("errored", args, 0)?;
    Ok(Value::Bool(decision("errored", r)?.error.is_some()))
}

fn reason(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    ensure_args_count("reason", args, 0)?;
    Ok(Value::from(decision("reason", r)?.reason.as_str()))
}

fn error(_: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    ensure_args_count("error", args, 0)?;
    Ok(Value::from(
        decision("error", r)?.error.clone().unwrap_or_default(),
    ))
}
