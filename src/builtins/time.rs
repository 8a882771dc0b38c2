// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::{is_dyn_or, BuiltinFcn, CheckFcn, Receiver};
use crate::error::EvalError;
use crate::interpreter::CostTracker;
use crate::types::{DeclType, ScalarType};
use crate::value::Value;

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

pub fn register(m: &mut HashMap<&'static str, (Receiver, CheckFcn, BuiltinFcn)>) {
    m.insert("getFullYear", (Receiver::Required, check_timestamp_getter, get_full_year));
    m.insert("getMonth", (Receiver::Required, check_timestamp_getter, get_month));
    m.insert("getDayOfMonth", (Receiver::Required, check_timestamp_getter, get_day_of_month));
    m.insert("getDate", (Receiver::Required, check_timestamp_getter, get_date));
    m.insert("getDayOfWeek", (Receiver::Required, check_timestamp_getter, get_day_of_week));
    m.insert("getHours", (Receiver::Required, check_time_getter, get_hours));
    m.insert("getMinutes", (Receiver::Required, check_time_getter, get_minutes));
    m.insert("getSeconds", (Receiver::Required, check_time_getter, get_seconds));
    m.insert("getMilliseconds", (Receiver::Required, check_time_getter, get_milliseconds));
}

fn check_timestamp_getter(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let receiver = receiver?;
    (args.is_empty() && is_dyn_or(receiver, ScalarType::Timestamp)).then_some(DeclType::INT)
}

fn check_time_getter(receiver: Option<&DeclType>, args: &[DeclType]) -> Option<DeclType> {
    let receiver = receiver?;
    let ok = is_dyn_or(receiver, ScalarType::Timestamp) || receiver.is_scalar(ScalarType::Duration);
    (args.is_empty() && ok).then_some(DeclType::INT)
}

fn timestamp(fcn: &str, receiver: Option<&Value>) -> Result<DateTime<Utc>, EvalError> {
    match receiver {
        Some(Value::Timestamp(t)) => Ok(*t),
        Some(v) => Err(EvalError::NoSuchOverload(format!(
            "{fcn} applied to {}",
            v.type_name()
        ))),
        None => Err(EvalError::NoSuchOverload(fcn.to_string())),
    }
}

fn get_full_year(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Int(timestamp("getFullYear", r)?.year() as i64))
}

fn get_month(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Int(timestamp("getMonth", r)?.month0() as i64))
}

fn get_day_of_month(
    _: &mut CostTracker,
    r: Option<&Value>,
    _: &[Value],
) -> Result<Value, EvalError> {
    Ok(Value::Int(timestamp("getDayOfMonth", r)?.day0() as i64))
}

fn get_date(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Int(timestamp("getDate", r)?.day() as i64))
}

fn get_day_of_week(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Int(
        timestamp("getDayOfWeek", r)?.weekday().num_days_from_sunday() as i64,
    ))
}

fn time_component(
    fcn: &str,
    receiver: Option<&Value>,
    of_timestamp: fn(&DateTime<Utc>) -> i64,
    of_duration: fn(&Duration) -> i64,
) -> Result<Value, EvalError> {
    match receiver {
        Some(Value::Duration(d)) => Ok(Value::Int(of_duration(d))),
        _ => Ok(Value::Int(of_timestamp(&timestamp(fcn, receiver)?))),
    }
}

fn get_hours(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    time_component("getHours", r, |t| t.hour() as i64, |d| d.num_hours())
}

fn get_minutes(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    time_component("getMinutes", r, |t| t.minute() as i64, |d| d.num_minutes())
}

fn get_seconds(_: &mut CostTracker, r: Option<&Value>, _: &[Value]) -> Result<Value, EvalError> {
    time_component("getSeconds", r, |t| t.second() as i64, |d| d.num_seconds())
}

fn get_milliseconds(
    _: &mut CostTracker,
    r: Option<&Value>,
    _: &[Value],
) -> Result<Value, EvalError> {
    time_component(
        "getMilliseconds",
        r,
        |t| (t.nanosecond() / 1_000_000) as i64,
        |d| d.num_milliseconds(),
    )
}

/// Parses a duration such as `1h30m`, `-1.5s` or `300ms`.
pub fn parse_duration(text: &str) -> Result<Duration, EvalError> {
    let invalid = || EvalError::InvalidArgument(format!("invalid duration {text:?}"));
    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: i128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_end == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
        rest = &rest[number_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale: f64 = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];
        total_nanos += (number * scale).round() as i128;
    }

    let nanos = i64::try_from(if negative { -total_nanos } else { total_nanos })
        .map_err(|_| EvalError::Overflow("duration"))?;
    Ok(Duration::nanoseconds(nanos))
}

/// Formats a duration as seconds, e.g. `90s` or `1.5s`.
pub fn format_duration(d: &Duration) -> String {
    let secs = d.num_seconds();
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return format!("{secs}s");
    }
    let sign = if secs < 0 || nanos < 0 { "-" } else { "" };
    let frac = format!("{:09}", nanos.unsigned_abs());
    format!(
        "{sign}{}.{}s",
        secs.unsigned_abs(),
        frac.trim_end_matches('0')
    )
}

/// Parses an RFC 3339 timestamp.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, EvalError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EvalError::InvalidArgument(format!("invalid timestamp {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_go_style_durations() {
        assert_eq!(parse_duration("1h30m").ok(), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("-1.5s").ok(), Some(Duration::milliseconds(-1500)));
        assert_eq!(parse_duration("300ms").ok(), Some(Duration::milliseconds(300)));
        assert_eq!(parse_duration("0").ok(), Some(Duration::zero()));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn formats_durations_as_seconds() {
        assert_eq!(format_duration(&Duration::minutes(90)), "5400s");
        assert_eq!(format_duration(&Duration::milliseconds(1500)), "1.5s");
        assert_eq!(format_duration(&Duration::milliseconds(-1500)), "-1.5s");
    }
}
