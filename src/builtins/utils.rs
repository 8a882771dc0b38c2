// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::EvalError;
use crate::value::Value;

pub fn no_overload(fcn: &str, v: &Value) -> EvalError {
    EvalError::NoSuchOverload(format!("{fcn} applied to {}", v.type_name()))
}

pub fn ensure_args_count(fcn: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::NoSuchOverload(format!(
            "{fcn} expects {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

pub fn ensure_receiver<'a>(fcn: &str, receiver: Option<&'a Value>) -> Result<&'a Value, EvalError> {
    receiver.ok_or_else(|| EvalError::NoSuchOverload(format!("{fcn} requires a receiver")))
}

pub fn ensure_string<'a>(fcn: &str, v: &'a Value) -> Result<&'a str, EvalError> {
    match v {
        Value::String(s) => Ok(s),
        _ => Err(no_overload(fcn, v)),
    }
}

pub fn ensure_int(fcn: &str, v: &Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(*i),
        _ => Err(no_overload(fcn, v)),
    }
}

pub fn ensure_list<'a>(fcn: &str, v: &'a Value) -> Result<&'a [Value], EvalError> {
    match v {
        Value::List(items) => Ok(items.as_slice()),
        _ => Err(no_overload(fcn, v)),
    }
}

pub fn ensure_string_collection<'a>(fcn: &str, v: &'a Value) -> Result<Vec<&'a str>, EvalError> {
    ensure_list(fcn, v)?
        .iter()
        .map(|item| ensure_string(fcn, item))
        .collect()
}

/// Converts a character offset into a byte offset, failing when it lies past the end.
pub fn char_to_byte(fcn: &str, s: &str, offset: i64) -> Result<usize, EvalError> {
    let out_of_range = || EvalError::IndexOutOfRange(format!("{fcn}: index {offset}"));
    let offset = usize::try_from(offset).map_err(|_| out_of_range())?;
    if offset == 0 {
        return Ok(0);
    }
    match s.char_indices().nth(offset) {
        Some((idx, _)) => Ok(idx),
        None if s.chars().count() == offset => Ok(s.len()),
        None => Err(out_of_range()),
    }
}
