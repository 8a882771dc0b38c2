// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{
    char_to_byte, ensure_args_count, ensure_int, ensure_receiver, ensure_string,
    ensure_string_collection, no_overload,
};
use crate::builtins::{is_dyn_or, lists, BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, ScalarType};
use crate::value::Value;

use std::collections::HashMap;

use regex::Regex;

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("size", (Receiver::Optional, check_size, size));
    m.insert("contains", (Receiver::Required, check_string_predicate, contains));
    m.insert("startsWith", (Receiver::Required, check_string_predicate, starts_with));
    m.insert("endsWith", (Receiver::Required, check_string_predicate, ends_with));
    m.insert("matches", (Receiver::Optional, check_string_predicate, matches));
    m.insert("lowerAscii", (Receiver::Required, check_string_transform, lower_ascii));
    m.insert("upperAscii", (Receiver::Required, check_string_transform, upper_ascii));
    m.insert("trim", (Receiver::Required, check_string_transform, trim));
    m.insert("replace", (Receiver::Required, check_replace, replace));
    m.insert("substring", (Receiver::Required, check_substring, substring));
    m.insert("split", (Receiver::Required, check_split, split));
    m.insert("join", (Receiver::Required, check_join, join));
    m.insert("indexOf", (Receiver::Required, check_index_of, index_of));
    m.insert("lastIndexOf", (Receiver::Required, check_index_of, last_index_of));
}

fn check_size(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = match receiver? {
        DeclType::List(_) | DeclType::Map(_, _) => true,
        t => is_dyn_or(t, ScalarType::String) || t.is_scalar(ScalarType::Bytes),
    };
    (ok && args.is_empty()).then_some(DeclType::INT)
}

fn check_string_predicate(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is_dyn_or(receiver?, ScalarType::String)
        && args.len() == 1
        && is_dyn_or(&args[0], ScalarType::String);
    ok.then_some(DeclType::BOOL)
}

fn check_string_transform(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (is_dyn_or(receiver?, ScalarType::String) && args.is_empty()).then_some(DeclType::STRING)
}

fn check_replace(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is_dyn_or(receiver?, ScalarType::String)
        && matches!(args.len(), 2 | 3)
        && is_dyn_or(&args[0], ScalarType::String)
        && is_dyn_or(&args[1], ScalarType::String)
        && args.get(2).map_or(true, |a| is_dyn_or(a, ScalarType::Int));
    ok.then_some(DeclType::STRING)
}

fn check_substring(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is_dyn_or(receiver?, ScalarType::String)
        && matches!(args.len(), 1 | 2)
        && args.iter().all(|a| is_dyn_or(a, ScalarType::Int));
    ok.then_some(DeclType::STRING)
}

fn check_split(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is_dyn_or(receiver?, ScalarType::String)
        && matches!(args.len(), 1 | 2)
        && is_dyn_or(&args[0], ScalarType::String)
        && args.get(1).map_or(true, |a| is_dyn_or(a, ScalarType::Int));
    ok.then(|| DeclType::list(DeclType::STRING))
}

fn check_join(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = match receiver? {
        DeclType::List(elem) => is_dyn_or(elem, ScalarType::String),
        t => t.is_dyn_like(),
    };
    let ok = ok && args.len() <= 1 && args.iter().all(|a| is_dyn_or(a, ScalarType::String));
    ok.then_some(DeclType::STRING)
}

fn check_index_of(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = match receiver? {
        DeclType::List(_) => args.len() == 1,
        t if t.is_dyn_like() => matches!(args.len(), 1 | 2),
        t => {
            t.is_scalar(ScalarType::String)
                && matches!(args.len(), 1 | 2)
                && is_dyn_or(&args[0], ScalarType::String)
                && args.get(1).map_or(true, |a| is_dyn_or(a, ScalarType::Int))
        }
    };
    ok.then_some(DeclType::INT)
}

fn size(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "size";
    ensure_args_count(name, args, 0)?;
    let v = ensure_receiver(name, r)?;
    let n = match v {
        Value::String(s) => {
            cost.charge_size(s.len())?;
            s.chars().count()
        }
        Value::Bytes(b) => b.len(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        _ => return Err(no_overload(name, v)),
    };
    Ok(Value::Int(n as i64))
}

fn string_receiver<'a>(
    fcn: &str,
    cost: &mut CostTracker,
    r: Option<&'a Value>,
) -> Result<&'a str, EvalError> {
    let s = ensure_string(fcn, ensure_receiver(fcn, r)?)?;
    cost.charge_size(s.len())?;
    Ok(s)
}

fn string_predicate(
    fcn: &str,
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
    pred: fn(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    ensure_args_count(fcn, args, 1)?;
    let s = string_receiver(fcn, cost, r)?;
    let arg = ensure_string(fcn, &args[0])?;
    Ok(Value::Bool(pred(s, arg)))
}

fn contains(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    string_predicate("contains", cost, r, args, |s, p| s.contains(p))
}

fn starts_with(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    string_predicate("startsWith", cost, r, args, |s, p| s.starts_with(p))
}

fn ends_with(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    string_predicate("endsWith", cost, r, args, |s, p| s.ends_with(p))
}

fn matches(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "matches";
    ensure_args_count(name, args, 1)?;
    let s = string_receiver(name, cost, r)?;
    let pattern = ensure_string(name, &args[0])?;
    cost.charge_size(pattern.len())?;
    let re = Regex::new(pattern)
        .map_err(|e| EvalError::InvalidArgument(format!("invalid regex {pattern:?}: {e}")))?;
    Ok(Value::Bool(re.is_match(s)))
}

fn lower_ascii(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    ensure_args_count("lowerAscii", args, 0)?;
    Ok(Value::from(string_receiver("lowerAscii", cost, r)?.to_ascii_lowercase()))
}

fn upper_ascii(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    ensure_args_count("upperAscii", args, 0)?;
    Ok(Value::from(string_receiver("upperAscii", cost, r)?.to_ascii_uppercase()))
}

fn trim(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    ensure_args_count("trim", args, 0)?;
    Ok(Value::from(string_receiver("trim", cost, r)?.trim()))
}

fn replace(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "replace";
    let s = string_receiver(name, cost, r)?;
    if !matches!(args.len(), 2 | 3) {
        return Err(EvalError::NoSuchOverload(format!("{name} expects 2 or 3 arguments")));
    }
    let from = ensure_string(name, &args[0])?;
    let to = ensure_string(name, &args[1])?;
    let limit = match args.get(2) {
        Some(n) => ensure_int(name, n)?,
        None => -1,
    };
    Ok(Value::from(match usize::try_from(limit) {
        Ok(n) => s.replacen(from, to, n),
        Err(_) => s.replace(from, to),
    }))
}

fn substring(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "substring";
    let s = string_receiver(name, cost, r)?;
    let start = char_to_byte(name, s, ensure_int(name, args.first().unwrap_or(&Value::Null))?)?;
    let end = match args.get(1) {
        Some(end) => char_to_byte(name, s, ensure_int(name, end)?)?,
        None => s.len(),
    };
    if start > end {
        return Err(EvalError::IndexOutOfRange(format!(
            "{name}: start index is greater than end index"
        )));
    }
    Ok(Value::from(&s[start..end]))
}

fn split(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "split";
    let s = string_receiver(name, cost, r)?;
    let sep = ensure_string(name, args.first().unwrap_or(&Value::Null))?;
    let limit = match args.get(1) {
        Some(n) => ensure_int(name, n)?,
        None => -1,
    };
    let parts: Vec<Value> = match usize::try_from(limit) {
        Ok(0) => vec![],
        Ok(n) => s.splitn(n, sep).map(Value::from).collect(),
        Err(_) => s.split(sep).map(Value::from).collect(),
    };
    cost.charge_size(parts.len())?;
    Ok(Value::from(parts))
}

fn join(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "join";
    let parts = ensure_string_collection(name, ensure_receiver(name, r)?)?;
    let sep = match args.first() {
        Some(sep) => ensure_string(name, sep)?,
        None => "",
    };
    let joined = parts.join(sep);
    cost.charge_size(joined.len())?;
    Ok(Value::from(joined))
}

fn string_index(
    fcn: &str,
    cost: &mut CostTracker,
    s: &str,
    args: &[Value],
    last: bool,
) -> Result<Value, EvalError> {
    cost.charge_size(s.len())?;
    let needle = ensure_string(fcn, args.first().unwrap_or(&Value::Null))?;
    let found = match (args.get(1), last) {
        (None, false) => s.find(needle),
        (None, true) => s.rfind(needle),
        (Some(offset), false) => {
            let start = char_to_byte(fcn, s, ensure_int(fcn, offset)?)?;
            s[start..].find(needle).map(|i| i + start)
        }
        (Some(offset), true) => {
            let end = char_to_byte(fcn, s, ensure_int(fcn, offset)?)?;
            let end = (end + needle.len()).min(s.len());
            s.get(..end).and_then(|prefix| prefix.rfind(needle))
        }
    };
    Ok(Value::Int(match found {
        Some(byte_idx) => s[..byte_idx].chars().count() as i64,
        None => -1,
    }))
}

fn index_of(cost: &mut CostTracker, r: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "indexOf";
    match ensure_receiver(name, r)? {
        Value::List(items) => lists::index_of(name, cost, items, args, false),
        Value::String(s) => string_index(name, cost, s, args, false),
        v => Err(no_overload(name, v)),
    }
}

fn last_index_of(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "lastIndexOf";
    match ensure_receiver(name, r)? {
        Value::List(items) => lists::index_of(name, cost, items, args, true),
        Value::String(s) => string_index(name, cost, s, args, true),
        v => Err(no_overload(name, v)),
    }
}
