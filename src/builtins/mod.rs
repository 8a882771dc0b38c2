// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod authz;
pub mod conversions;
pub mod identifiers;
pub mod lists;
pub mod net;
pub mod strings;
pub mod time;
pub mod utils;

use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, ScalarType};
use crate::value::Value;

use std::collections::HashMap;

use lazy_static::lazy_static;

/// How a builtin may be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Global function: `int(x)`.
    None,
    /// Member function: `s.startsWith(p)`.
    Required,
    /// Either form: `size(x)` or `x.size()`.
    Optional,
}

/// Returns the result type for the given receiver and argument types, or `None` when no overload
/// accepts them.
pub type CheckFcn = fn(Option<&DeclType>, &[DeclType]) -> Option<DeclType>;

pub type BuiltinFcn = fn(&mut CostTracker, Option<&Value>, &[Value]) -> Result<Value, EvalError>;

pub type Builtin = (Receiver, CheckFcn, BuiltinFcn);

#[rustfmt::skip]
lazy_static! {
    pub static ref BUILTINS: HashMap<&'static str, Builtin> = {
	let mut m : HashMap<&'static str, Builtin>  = HashMap::new();

	strings::register(&mut m);
	lists::register(&mut m);
	conversions::register(&mut m);
	time::register(&mut m);
	authz::register(&mut m);
	net::register(&mut m);
	identifiers::register(&mut m);

	m
    };
}

/// Finds a builtin and normalizes the call so that optional-receiver functions always see their
/// first operand as the receiver.
pub fn resolve<'a, T>(
    name: &str,
    target: Option<&'a T>,
    args: &'a [T],
) -> Option<(&'static Builtin, Option<&'a T>, &'a [T])> {
    let builtin = BUILTINS.get(name)?;
    match (builtin.0, target) {
        (Receiver::None, None) => Some((builtin, None, args)),
        (Receiver::Required | Receiver::Optional, Some(t)) => Some((builtin, Some(t), args)),
        (Receiver::Optional, None) => {
            let (first, rest) = args.split_first()?;
            Some((builtin, Some(first), rest))
        }
        _ => None,
    }
}

/// True if `ty` is `dyn` or the given scalar.
pub fn is_dyn_or(ty: &DeclType, scalar: ScalarType) -> bool {
    ty.is_dyn_like() || ty.is_scalar(scalar)
}

/// Element type of a list, `dyn` for dynamically typed receivers.
pub fn list_elem(ty: &DeclType) -> Option<DeclType> {
    match ty {
        DeclType::List(elem) => Some(elem.as_ref().clone()),
        t if t.is_dyn_like() => Some(DeclType::DYN),
        _ => None,
    }
}
