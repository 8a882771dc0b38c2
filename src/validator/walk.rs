// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::tree::{CompiledValidator, CompiledValidatorNode, ValidatorId};
use super::values::validate_values;

use crate::activation::{Activation, NodeActivation};
use crate::compiler::{CompiledExpression, CompiledRule};
use crate::error::{EvalError, FieldError, FieldErrorKind, FieldErrors};
use crate::path::FieldPath;
use crate::program::EvalOptions;
use crate::schema::{ListType, SchemaNode};
use crate::value::Value;

use tracing::{trace, warn};

/// Default limit on the length of an evaluated message expression, in bytes.
pub const MAX_MESSAGE_EXPRESSION_LENGTH: usize = 5120;

/// Per-call settings of a validation walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub eval: EvalOptions,
    pub max_message_expression_length: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            eval: EvalOptions::default(),
            max_message_expression_length: MAX_MESSAGE_EXPRESSION_LENGTH,
        }
    }
}

fn rule_error_string(rule: &CompiledRule) -> String {
    match rule.rule.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => rule.rule.rule.trim().to_string(),
    }
}

fn rule_message_or_default(rule: &CompiledRule) -> String {
    match rule.rule.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => format!("failed rule: {}", rule_error_string(rule)),
    }
}

/// Outcome of evaluating a message expression.
enum Message {
    Evaluated(String),
    /// Evaluation failed, the static message is used instead.
    Fallback,
    /// The call must stop.
    Fatal(String),
}

impl CompiledValidator {
    /// Validates `new` against the tree. `old` is the previous value on updates.
    ///
    /// Returns the errors found and the remaining budget. A negative budget means that the
    /// budget ran out and validation stopped early, so the object's validity is unknown.
    pub fn validate(
        &self,
        new: &Value,
        old: Option<&Value>,
        context: &dyn Activation,
        options: &WalkOptions,
        budget: i64,
    ) -> (FieldErrors, i64) {
        let Some(root) = self.root() else {
            return (FieldErrors::new(), budget);
        };
        let walker = Walker {
            validator: self,
            context,
            options,
        };
        walker.validate(root, &FieldPath::root(), new, old, budget)
    }
}

struct Walker<'a> {
    validator: &'a CompiledValidator,
    context: &'a dyn Activation,
    options: &'a WalkOptions,
}

impl Walker<'_> {
    fn validate(
        &self,
        id: ValidatorId,
        path: &FieldPath,
        new: &Value,
        old: Option<&Value>,
        budget: i64,
    ) -> (FieldErrors, i64) {
        // Rules only see present values. Presence is checked by the parent.
        if new.is_null() {
            return (FieldErrors::new(), budget);
        }
        let old = old.filter(|v| !v.is_null());
        let node = self.validator.node(id);
        let schema_node = self.validator.schema().node(node.schema_node);

        let mut errs = validate_values(path, &schema_node.validations, new);

        if let Some(e) = &node.compilation_error {
            errs.push(FieldError::internal(
                path,
                format!("rule compiler initialization error: {e}"),
            ));
            return (errs, budget);
        }

        let (rule_errs, remaining) = self.validate_rules(node, path, new, old, budget);
        errs.extend(rule_errs);
        if remaining < 0 {
            return (errs, remaining);
        }

        let (child_errs, remaining) = match new {
            Value::List(items) => {
                self.validate_list(node, schema_node, path, items, old, remaining)
            }
            Value::Map(_) => self.validate_map(node, path, new, old, remaining),
            _ => (FieldErrors::new(), remaining),
        };
        errs.extend(child_errs);
        (errs, remaining)
    }

    fn validate_rules(
        &self,
        node: &CompiledValidatorNode,
        path: &FieldPath,
        new: &Value,
        old: Option<&Value>,
        budget: i64,
    ) -> (FieldErrors, i64) {
        let mut errs = FieldErrors::new();
        if node.rules.is_empty() {
            return (errs, budget);
        }
        if budget <= 0 {
            warn!(path = %path, "validation cost budget exhausted");
            errs.push(FieldError::budget_exceeded(path));
            return (errs, -1);
        }

        let mut remaining = budget;
        let activation = NodeActivation::new(
            new.clone(),
            old.cloned(),
            &node.siblings,
            self.context,
        );
        for rule in &node.rules {
            let expression = &rule.expression;
            let Some(program) = expression.program() else {
                if let Some(e) = expression.error() {
                    errs.push(FieldError::invalid(
                        path,
                        format!("rule compile error: {e}"),
                    ));
                }
                continue;
            };
            if let Some(e) = rule.message_expression.as_ref().and_then(|m| m.error()) {
                errs.push(FieldError::invalid(
                    path,
                    format!("messageExpression compile error: {e}"),
                ));
                continue;
            }
            if rule.is_transition() && old.is_none() {
                continue;
            }

            let details = program.eval(&activation, &self.options.eval);
            let Some(cost) = details.actual_cost else {
                errs.push(FieldError::internal(
                    path,
                    format!(
                        "runtime cost could not be calculated for validation rule: {}, no further validation rules will be run",
                        rule_error_string(rule)
                    ),
                ));
                return (errs, -1);
            };
            trace!(rule = %expression.source(), cost, "evaluated validation rule");
            if i64::try_from(cost).map_or(true, |c| c > remaining) {
                warn!(path = %path, cost, remaining, "validation cost budget exhausted");
                errs.push(FieldError::budget_exceeded(path));
                return (errs, -1);
            }
            remaining -= cost as i64;

            let passed = match details.result {
                Ok(Value::Bool(b)) => b,
                Ok(v) => {
                    errs.push(FieldError::invalid(
                        path,
                        format!(
                            "rule evaluated to {} instead of bool: {}",
                            v.type_name(),
                            rule_error_string(rule)
                        ),
                    ));
                    continue;
                }
                Err(EvalError::CostLimitExceeded) => {
                    errs.push(FieldError::invalid(
                        path,
                        format!(
                            "'{}': no further validation rules will be run due to call cost exceeds limit for rule: {}",
                            EvalError::CostLimitExceeded,
                            rule_error_string(rule)
                        ),
                    ));
                    return (errs, -1);
                }
                Err(e @ EvalError::Interrupted(_)) => {
                    errs.push(FieldError::invalid(
                        path,
                        format!(
                            "{e} evaluating rule: {}, no further validation rules will be run",
                            rule_error_string(rule)
                        ),
                    ));
                    return (errs, -1);
                }
                Err(e) if e.is_no_such_overload() => {
                    errs.push(FieldError::invalid(
                        path,
                        format!(
                            "'{e}': call arguments did not match a supported operator, function or macro signature for rule: {}",
                            rule_error_string(rule)
                        ),
                    ));
                    continue;
                }
                Err(e) => {
                    errs.push(FieldError::invalid(
                        path,
                        format!("{e} evaluating rule: {}", rule_error_string(rule)),
                    ));
                    continue;
                }
            };
            if passed {
                continue;
            }

            let detail = match &rule.message_expression {
                Some(message) => match self.eval_message(message, &activation, &mut remaining) {
                    Message::Evaluated(m) => m,
                    Message::Fallback => rule_message_or_default(rule),
                    Message::Fatal(m) => {
                        warn!(path = %path, "message expression stopped validation");
                        errs.push(FieldError::invalid(path, m));
                        return (errs, -1);
                    }
                },
                None => rule_message_or_default(rule),
            };
            errs.push(rule_failure(path, rule, detail));
        }
        (errs, remaining)
    }

    fn eval_message(
        &self,
        message: &CompiledExpression,
        activation: &dyn Activation,
        remaining: &mut i64,
    ) -> Message {
        let Some(program) = message.program() else {
            return Message::Fallback;
        };
        let details = program.eval(activation, &self.options.eval);
        let Some(cost) = details.actual_cost else {
            return Message::Fatal(format!(
                "runtime cost could not be calculated for messageExpression: {:?}",
                message.source()
            ));
        };
        if i64::try_from(cost).map_or(true, |c| c > *remaining) {
            return Message::Fatal(
                "messageExpression evaluation failed due to running out of cost budget, no further validation rules will be run"
                    .to_string(),
            );
        }
        if details.result == Err(EvalError::CostLimitExceeded) {
            return Message::Fatal(format!(
                "no further validation rules will be run due to call cost exceeds limit for messageExpression: {:?}",
                message.source()
            ));
        }
        *remaining -= cost as i64;

        let text = match details.result {
            Ok(Value::String(s)) => s,
            Ok(_) => {
                trace!("messageExpression failed to convert to string");
                return Message::Fallback;
            }
            Err(e) => {
                trace!(error = %e, "messageExpression evaluation failed");
                return Message::Fallback;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty()
            || trimmed.contains('\n')
            || trimmed.len() > self.options.max_message_expression_length
        {
            return Message::Fallback;
        }
        Message::Evaluated(trimmed.to_string())
    }

    fn validate_list(
        &self,
        node: &CompiledValidatorNode,
        schema_node: &SchemaNode,
        path: &FieldPath,
        items: &[Value],
        old: Option<&Value>,
        budget: i64,
    ) -> (FieldErrors, i64) {
        let mut errs = FieldErrors::new();
        let Some(items_id) = node.items else {
            return (errs, budget);
        };
        let old_items = old.and_then(Value::as_list).map(Vec::as_slice);
        let mut remaining = budget;
        for (idx, item) in items.iter().enumerate() {
            let old_item =
                old_items.and_then(|o| correlate(&schema_node.list_type, o, idx, item));
            let (child_errs, r) =
                self.validate(items_id, &path.index(idx), item, old_item, remaining);
            errs.extend(child_errs);
            remaining = r;
            if remaining < 0 {
                break;
            }
        }
        (errs, remaining)
    }

    fn validate_map(
        &self,
        node: &CompiledValidatorNode,
        path: &FieldPath,
        new: &Value,
        old: Option<&Value>,
        budget: i64,
    ) -> (FieldErrors, i64) {
        let mut errs = FieldErrors::new();
        let Some(fields) = new.as_map() else {
            return (errs, budget);
        };
        let mut remaining = budget;
        for (key, value) in fields.iter() {
            let Some(name) = key.as_str() else {
                continue;
            };
            let (child, child_path) = match node.properties.get(name) {
                Some(id) => (*id, path.child(name)),
                None => match node.additional_properties {
                    Some(id) => (id, path.key(name)),
                    None => continue,
                },
            };
            let old_value = old.and_then(|o| o.field(name));
            let (child_errs, r) = self.validate(child, &child_path, value, old_value, remaining);
            errs.extend(child_errs);
            remaining = r;
            if remaining < 0 {
                break;
            }
        }
        (errs, remaining)
    }
}

/// Finds the old element corresponding to `items[idx]`. Map lists correlate by key fields and
/// atomic lists by position. Set elements are not correlated.
fn correlate<'a>(
    list_type: &ListType,
    old: &'a [Value],
    idx: usize,
    item: &Value,
) -> Option<&'a Value> {
    match list_type {
        ListType::Atomic => old.get(idx),
        ListType::Set => None,
        ListType::Map(keys) => old
            .iter()
            .find(|candidate| keys.iter().all(|k| candidate.field(k) == item.field(k))),
    }
}

fn rule_failure(path: &FieldPath, rule: &CompiledRule, detail: String) -> FieldError {
    let path = match &rule.rule.field_path {
        Some(relative) => path.join_relative(relative).unwrap_or_else(|| path.clone()),
        None => path.clone(),
    };
    let kind = rule
        .rule
        .reason
        .map_or(FieldErrorKind::Invalid, |r| r.kind());
    FieldError::new(path, kind, detail)
}
