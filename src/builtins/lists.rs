// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_list, ensure_receiver, no_overload};
use crate::builtins::{list_elem, BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, ScalarType};
use crate::value::Value;

use std::collections::HashMap;

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("isSorted", (Receiver::Required, check_is_sorted, is_sorted));
    m.insert("sum", (Receiver::Required, check_sum, sum));
    m.insert("min", (Receiver::Required, check_min_max, min));
    m.insert("max", (Receiver::Required, check_min_max, max));
}

fn is_summable(elem: &DeclType) -> bool {
    elem.is_dyn_like()
        || [
            ScalarType::Int,
            ScalarType::Uint,
            ScalarType::Double,
            ScalarType::Duration,
        ]
        .iter()
        .any(|s| elem.is_scalar(*s))
}

fn is_comparable(elem: &DeclType) -> bool {
    is_summable(elem)
        || [
            ScalarType::Bool,
            ScalarType::String,
            ScalarType::Bytes,
            ScalarType::Timestamp,
        ]
        .iter()
        .any(|s| elem.is_scalar(*s))
}

fn check_is_sorted(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let elem = list_elem(receiver?)?;
    (args.is_empty() && is_comparable(&elem)).then_some(DeclType::BOOL)
}

fn check_sum(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let elem = list_elem(receiver?)?;
    (args.is_empty() && is_summable(&elem)).then_some(elem)
}

fn check_min_max(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let elem = list_elem(receiver?)?;
    (args.is_empty() && is_comparable(&elem)).then_some(elem)
}

fn list_receiver<'a>(
    fcn: &str,
    cost: &mut CostTracker,
    r: Option<&'a Value>,
    args: &[Value],
) -> Result<&'a [Value], EvalError> {
    ensure_args_count(fcn, args, 0)?;
    let items = ensure_list(fcn, ensure_receiver(fcn, r)?)?;
    cost.charge_size(items.len())?;
    Ok(items)
}

fn same_kind(a: &Value, b: &Value) -> bool {
    core::mem::discriminant(a) == core::mem::discriminant(b)
}

fn is_sorted(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "isSorted";
    let items = list_receiver(name, cost, r, args)?;
    for pair in items.windows(2) {
        if !same_kind(&pair[0], &pair[1]) {
            return Err(no_overload(name, &pair[1]));
        }
        if pair[0] > pair[1] {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn add(fcn: &str, acc: Value, item: &Value) -> Result<Value, EvalError> {
    Ok(match (&acc, item) {
        (Value::Int(a), Value::Int(b)) => {
            Value::Int(a.checked_add(*b).ok_or(EvalError::Overflow("int"))?)
        }
        (Value::Uint(a), Value::Uint(b)) => {
            Value::Uint(a.checked_add(*b).ok_or(EvalError::Overflow("uint"))?)
        }
        (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (Value::Duration(a), Value::Duration(b)) => {
            Value::Duration(a.checked_add(b).ok_or(EvalError::Overflow("duration"))?)
        }
        _ => return Err(no_overload(fcn, item)),
    })
}

fn sum(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "sum";
    let items = list_receiver(name, cost, r, args)?;
    let Some((first, rest)) = items.split_first() else {
        return Ok(Value::Int(0));
    };
    if !matches!(
        first,
        Value::Int(_) | Value::Uint(_) | Value::Double(_) | Value::Duration(_)
    ) {
        return Err(no_overload(name, first));
    }
    rest.iter()
        .try_fold(first.clone(), |acc, item| add(name, acc, item))
}

fn extremum(
    fcn: &str,
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
    pick_later: fn(&Value, &Value) -> bool,
) -> Result<Value, EvalError> {
    let items = list_receiver(fcn, cost, r, args)?;
    let Some((first, rest)) = items.split_first() else {
        return Err(EvalError::InvalidArgument(format!(
            "{fcn} called on an empty list"
        )));
    };
    let mut best = first;
    for item in rest {
        if !same_kind(best, item) {
            return Err(no_overload(fcn, item));
        }
        if pick_later(best, item) {
            best = item;
        }
    }
    Ok(best.clone())
}

fn min(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    extremum("min", cost, r, args, |best, item| item < best)
}

fn max(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    extremum("max", cost, r, args, |best, item| item > best)
}

/// Position of the first (or last) element equal to the argument, or -1.
pub fn index_of(
    fcn: &str,
    cost: &mut CostTracker,
    items: &[Value],
    args: &[Value],
    last: bool,
) -> Result<Value, EvalError> {
    ensure_args_count(fcn, args, 1)?;
    cost.charge_size(items.len())?;
    let needle = &args[0];
    let found = if last {
        items.iter().rposition(|item| item == needle)
    } else {
        items.iter().position(|item| item == needle)
    };
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}
