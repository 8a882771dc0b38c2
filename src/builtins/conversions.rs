// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::time::{format_duration, parse_duration, parse_timestamp};
use crate::builtins::utils::{ensure_args_count, no_overload};
use crate::builtins::{BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, OpaqueType, ScalarType, ScalarType as S};
use crate::value::Value;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("int", (Receiver::None, check_int, to_int));
    m.insert("uint", (Receiver::None, check_uint, to_uint));
    m.insert("double", (Receiver::None, check_double, to_double));
    m.insert("string", (Receiver::None, check_string, to_string));
    m.insert("bool", (Receiver::None, check_bool, to_bool));
    m.insert("bytes", (Receiver::None, check_bytes, to_bytes));
    m.insert("duration", (Receiver::None, check_duration, to_duration));
    m.insert("timestamp", (Receiver::None, check_timestamp, to_timestamp));
    m.insert("dyn", (Receiver::None, check_dyn, to_dyn));
}

fn single_arg_of(
    receiver: Option<&DeclType>,
    args: &[DeclType],
    accepted: &[ScalarType],
    result: DeclType,
) -> Option<DeclType> {
    if receiver.is_some() || args.len() != 1 {
        return None;
    }
    let arg = &args[0];
    (arg.is_dyn_like() || accepted.iter().any(|s| arg.is_scalar(*s))).then_some(result)
}

fn check_int(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let accepted = [S::Int, S::Uint, S::Double, S::String, S::Timestamp];
    single_arg_of(r, args, &accepted, DeclType::INT)
}

fn check_uint(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Int, S::Uint, S::Double, S::String], DeclType::UINT)
}

fn check_double(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Int, S::Uint, S::Double, S::String], DeclType::DOUBLE)
}

fn check_string(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let accepted = [
        S::Int,
        S::Uint,
        S::Double,
        S::String,
        S::Bool,
        S::Bytes,
        S::Duration,
        S::Timestamp,
    ];
    if let [DeclType::Opaque(OpaqueType::Ip | OpaqueType::Cidr)] = args {
        return r.is_none().then_some(DeclType::STRING);
    }
    single_arg_of(r, args, &accepted, DeclType::STRING)
}

fn check_bool(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Bool, S::String], DeclType::BOOL)
}

fn check_bytes(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Bytes, S::String], DeclType::BYTES)
}

fn check_duration(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Duration, S::String], DeclType::DURATION)
}

fn check_timestamp(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    single_arg_of(r, args, &[S::Timestamp, S::String, S::Int], DeclType::TIMESTAMP)
}

fn check_dyn(r: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    (r.is_none() && args.len() == 1).then_some(DeclType::DYN)
}

fn single<'a>(fcn: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    ensure_args_count(fcn, args, 1)?;
    Ok(&args[0])
}

fn parse_number<T: core::str::FromStr>(fcn: &str, s: &str) -> Result<T, EvalError> {
    s.parse()
        .map_err(|_| EvalError::InvalidArgument(format!("{fcn}: cannot convert {s:?}")))
}

// Doubles convert only when they are strictly inside the target range.
fn double_in_range(fcn: &'static str, d: f64, min: f64, max: f64) -> Result<f64, EvalError> {
    if d.is_finite() && d > min && d < max {
        Ok(d.trunc())
    } else {
        Err(EvalError::Overflow(fcn))
    }
}

fn to_int(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "int";
    Ok(Value::Int(match single(name, args)? {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).map_err(|_| EvalError::Overflow(name))?,
        Value::Double(d) => {
            double_in_range(name, *d, i64::MIN as f64 - 1.0, i64::MAX as f64)? as i64
        }
        Value::String(s) => parse_number(name, s)?,
        Value::Timestamp(t) => t.timestamp(),
        v => return Err(no_overload(name, v)),
    }))
}

fn to_uint(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "uint";
    Ok(Value::Uint(match single(name, args)? {
        Value::Int(i) => u64::try_from(*i).map_err(|_| EvalError::Overflow(name))?,
        Value::Uint(u) => *u,
        Value::Double(d) => double_in_range(name, *d, -1.0, u64::MAX as f64)? as u64,
        Value::String(s) => parse_number(name, s)?,
        v => return Err(no_overload(name, v)),
    }))
}

fn to_double(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "double";
    Ok(Value::Double(match single(name, args)? {
        Value::Int(i) => *i as f64,
        Value::Uint(u) => *u as f64,
        Value::Double(d) => *d,
        Value::String(s) => parse_number(name, s)?,
        v => return Err(no_overload(name, v)),
    }))
}

fn to_string(
    cost: &mut CostTracker,
    _: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "string";
    let v = single(name, args)?;
    cost.charge_size(v.size())?;
    Ok(match v {
        Value::String(_) => v.clone(),
        Value::Int(i) => Value::from(i.to_string()),
        Value::Uint(u) => Value::from(u.to_string()),
        Value::Double(d) => Value::from(d.to_string()),
        Value::Bool(b) => Value::from(b.to_string()),
        Value::Bytes(b) => Value::from(
            core::str::from_utf8(b)
                .map_err(|_| EvalError::InvalidArgument("invalid UTF-8 in bytes".to_string()))?,
        ),
        Value::Duration(d) => Value::from(format_duration(d)),
        Value::Timestamp(t) => Value::from(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Ip(ip) => Value::from(ip.to_string()),
        Value::Cidr(cidr) => Value::from(cidr.to_string()),
        v => return Err(no_overload(name, v)),
    })
}

fn to_bool(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "bool";
    Ok(Value::Bool(match single(name, args)? {
        Value::Bool(b) => *b,
        Value::String(s) => match s.as_ref() {
            "1" | "t" | "true" | "TRUE" | "True" => true,
            "0" | "f" | "false" | "FALSE" | "False" => false,
            _ => {
                return Err(EvalError::InvalidArgument(format!(
                    "{name}: cannot convert {s:?}"
                )))
            }
        },
        v => return Err(no_overload(name, v)),
    }))
}

fn to_bytes(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    let name = "bytes";
    Ok(match single(name, args)? {
        Value::String(s) => Value::Bytes(Arc::from(s.as_bytes())),
        v @ Value::Bytes(_) => v.clone(),
        v => return Err(no_overload(name, v)),
    })
}

fn to_duration(
    _: &mut CostTracker,
    _: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "duration";
    Ok(match single(name, args)? {
        Value::String(s) => Value::Duration(parse_duration(s)?),
        v @ Value::Duration(_) => v.clone(),
        v => return Err(no_overload(name, v)),
    })
}

fn to_timestamp(
    _: &mut CostTracker,
    _: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let name = "timestamp";
    Ok(match single(name, args)? {
        Value::String(s) => Value::Timestamp(parse_timestamp(s)?),
        Value::Int(secs) => Value::Timestamp(
            DateTime::from_timestamp(*secs, 0).ok_or(EvalError::Overflow(name))?,
        ),
        v @ Value::Timestamp(_) => v.clone(),
        v => return Err(no_overload(name, v)),
    })
}

fn to_dyn(_: &mut CostTracker, _: Option<&Value>, args: &[Value]) -> Result<Value, EvalError> {
    Ok(single("dyn", args)?.clone())
}
