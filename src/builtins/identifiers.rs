// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Named string formats: `self.name.isFormat('dns1123label')`.

use crate::builtins::utils::{ensure_args_count, ensure_receiver, ensure_string};
use crate::builtins::{is_dyn_or, BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, ScalarType};
use crate::value::Value;

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Name, maximum length and pattern of each known format.
const FORMATS: [(&str, usize, &str); 3] = [
    ("dns1123label", 63, r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"),
    (
        "dns1123subdomain",
        253,
        r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$",
    ),
    ("dns1035label", 63, r"^[a-z]([-a-z0-9]*[a-z0-9])?$"),
];

lazy_static! {
    static ref VALIDATORS: HashMap<&'static str, (usize, Result<Regex, regex::Error>)> = FORMATS
        .iter()
        .map(|(name, max, pattern)| (*name, (*max, Regex::new(pattern))))
        .collect();
}

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("isFormat", (Receiver::Required, check_format, is_format));
    m.insert(
        "isGenerateNameOfFormat",
        (Receiver::Required, check_format, is_generate_name_of_format),
    );
}

fn check_format(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let ok = is_dyn_or(receiver?, ScalarType::String)
        && args.len() == 1
        && is_dyn_or(&args[0], ScalarType::String);
    ok.then_some(DeclType::BOOL)
}

/// Validates `value` against a known format, `None` for unknown formats.
fn validate(format: &str, value: &str) -> Option<Result<bool, EvalError>> {
    let (max, pattern) = VALIDATORS.get(format)?;
    Some(match pattern {
        Ok(re) => Ok(value.len() <= *max && re.is_match(value)),
        Err(e) => Err(EvalError::InvalidArgument(format!("format {format}: {e}"))),
    })
}

fn operands<'a>(
    fcn: &str,
    cost: &mut CostTracker,
    r: Option<&'a Value>,
    args: &'a [Value],
) -> Result<(&'a str, &'a str), EvalError> {
    ensure_args_count(fcn, args, 1)?;
    let value = ensure_string(fcn, ensure_receiver(fcn, r)?)?;
    let format = ensure_string(fcn, &args[0])?;
    cost.charge_size(value.len())?;
    Ok((value, format))
}

fn is_format(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let (value, format) = operands("isFormat", cost, r, args)?;
    let valid = validate(format, value)
        .ok_or_else(|| EvalError::InvalidArgument(format!("invalid format: {format}")))??;
    Ok(Value::Bool(valid))
}

/// True if `value` used as a `generateName` prefix yields valid names of `format` once a random
/// suffix is appended.
fn is_generate_name_of_format(
    cost: &mut CostTracker,
    r: Option<&Value>,
    args: &[Value],
) -> Result<Value, EvalError> {
    let (value, format) = operands("isGenerateNameOfFormat", cost, r, args)?;
    // The suffix makes a trailing dash legal, but not a lone one.
    let prefix = match value.strip_suffix('-') {
        Some(head) if !head.is_empty() => format!("{head}a"),
        _ => value.to_string(),
    };
    let valid = validate(format, &prefix).ok_or_else(|| {
        EvalError::InvalidArgument(format!("unsupported format for generate name: {format}"))
    })??;
    Ok(Value::Bool(valid))
}
