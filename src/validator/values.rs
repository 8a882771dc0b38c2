// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{FieldError, FieldErrors};
use crate::path::FieldPath;
use crate::schema::ValueValidations;
use crate::value::Value;

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Uint(u) => Some(*u as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

fn quoted(json: &serde_json::Value) -> String {
    json.to_string()
}

/// Checks the budget-free constraints of a schema node.
pub fn validate_values(path: &FieldPath, v: &ValueValidations, value: &Value) -> FieldErrors {
    let mut errs = FieldErrors::new();
    if v.is_empty() {
        return errs;
    }

    if !v.enum_values.is_empty() {
        let json = value.to_json().unwrap_or(serde_json::Value::Null);
        if !v.enum_values.contains(&json) {
            let supported: Vec<String> = v.enum_values.iter().map(quoted).collect();
            errs.push(FieldError::not_supported(
                path,
                format!("{}: supported values: {}", quoted(&json), supported.join(", ")),
            ));
        }
    }

    if let Some(n) = as_f64(value) {
        if let Some(min) = v.minimum {
            if n < min || (v.exclusive_minimum && n == min) {
                let op = match v.exclusive_minimum {
                    true => "greater than",
                    false => "greater than or equal to",
                };
                errs.push(FieldError::invalid(
                    path,
                    format!("{value}: should be {op} {min}"),
                ));
            }
        }
        if let Some(max) = v.maximum {
            if n > max || (v.exclusive_maximum && n == max) {
                let op = match v.exclusive_maximum {
                    true => "less than",
                    false => "less than or equal to",
                };
                errs.push(FieldError::invalid(
                    path,
                    format!("{value}: should be {op} {max}"),
                ));
            }
        }
    }

    match value {
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = v.min_length.filter(|m| len < *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("{s:?}: should be at least {min} chars long"),
                ));
            }
            if let Some(max) = v.max_length.filter(|m| len > *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("{s:?}: should be at most {max} chars long"),
                ));
            }
            if let Some(pattern) = v.pattern.as_ref().filter(|p| !p.is_match(s)) {
                errs.push(FieldError::invalid(
                    path,
                    format!("{s:?}: should match '{}'", pattern.as_str()),
                ));
            }
        }
        Value::List(items) => {
            let len = items.len() as u64;
            if let Some(min) = v.min_items.filter(|m| len < *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("should have at least {min} items"),
                ));
            }
            if let Some(max) = v.max_items.filter(|m| len > *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("should have at most {max} items"),
                ));
            }
        }
        Value::Map(fields) => {
            let len = fields.len() as u64;
            if let Some(min) = v.min_properties.filter(|m| len < *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("should have at least {min} properties"),
                ));
            }
            if let Some(max) = v.max_properties.filter(|m| len > *m) {
                errs.push(FieldError::invalid(
                    path,
                    format!("should have at most {max} properties"),
                ));
            }
            for name in &v.required {
                if !fields.contains_key(&Value::from(name.as_str())) {
                    errs.push(FieldError::required(&path.child(name), ""));
                }
            }
        }
        _ => (),
    }
    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldErrorKind;
    use std::collections::BTreeMap;

    #[test]
    fn reports_each_violated_constraint() {
        let v = ValueValidations {
            minimum: Some(1.0),
            maximum: Some(10.0),
            exclusive_maximum: true,
            ..ValueValidations::default()
        };
        let path = FieldPath::root().child("spec").child("replicas");
        assert!(validate_values(&path, &v, &Value::Int(5)).is_empty());
        let errs = validate_values(&path, &v, &Value::Int(10));
        assert_eq!(errs.len(), 1);
        assert!(errs.to_string().contains("should be less than 10"));
        assert_eq!(validate_values(&path, &v, &Value::Int(0)).len(), 1);
    }

    #[test]
    fn checks_enum_and_required() {
        let v = ValueValidations {
            enum_values: vec![serde_json::json!("a"), serde_json::json!("b")],
            ..ValueValidations::default()
        };
        let errs = validate_values(&FieldPath::root(), &v, &Value::from("c"));
        assert_eq!(
            errs.iter().next().map(|e| e.kind),
            Some(FieldErrorKind::NotSupported)
        );

        let v = ValueValidations {
            required: vec!["name".to_string()],
            ..ValueValidations::default()
        };
        let empty = Value::from(BTreeMap::<Value, Value>::new());
        let errs = validate_values(&FieldPath::root(), &v, &empty);
        let err = errs.iter().next().cloned();
        assert_eq!(
            err.map(|e| (e.kind, e.path.to_string())),
            Some((FieldErrorKind::Required, "name".to_string()))
        );
    }
}
