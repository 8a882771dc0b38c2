// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::apply::{apply_configuration, check_type_names};
use super::json_patch::{apply_patch, object_type_name_at_path, PatchOperation, PatchOutcome};
use super::pointer::JsonPointer;
use super::{CompiledMutations, CompiledMutator, CompiledPatchOperation};

use crate::activation::{Activation, CallContext, OBJECT_VAR, OLD_OBJECT_VAR};
use crate::compiler::CompiledExpression;
use crate::error::MutationError;
use crate::program::EvalOptions;
use crate::types::{object_value, ROOT_TYPE_NAME};
use crate::value::Value;

use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

/// Result of running a mutation chain.
///
/// Mutations applied before a failure are kept in `object`. A failed chain must still be
/// rejected as a whole.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub object: JsonValue,
    /// Budget left after the chain. Negative when the budget ran out.
    pub remaining_budget: i64,
    pub error: Option<MutationError>,
}

impl MutationOutcome {
    pub fn into_result(self) -> Result<JsonValue, MutationError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.object),
        }
    }
}

struct Evaluator<'a> {
    options: &'a EvalOptions,
    index: usize,
    remaining: i64,
}

impl Evaluator<'_> {
    fn eval(
        &mut self,
        expression: &CompiledExpression,
        activation: &dyn Activation,
    ) -> Result<Value, MutationError> {
        let index = self.index;
        let Some(program) = expression.program() else {
            return Err(match expression.error() {
                Some(e) => MutationError::Compile {
                    index,
                    error: e.clone(),
                },
                None => MutationError::InvalidValue("expression was not compiled".to_string()),
            });
        };
        let details = program.eval(activation, self.options);
        let Some(cost) = details.actual_cost else {
            self.remaining = -1;
            return Err(MutationError::InvalidValue(format!(
                "runtime cost could not be calculated for mutation expression: {:?}",
                expression.source()
            )));
        };
        trace!(expression = %expression.source(), cost, "evaluated mutation expression");
        if i64::try_from(cost).map_or(true, |c| c > self.remaining) {
            warn!(index, cost, remaining = self.remaining, "mutation cost budget exhausted");
            self.remaining = -1;
            return Err(MutationError::BudgetExceeded { index });
        }
        self.remaining -= cost as i64;
        details
            .result
            .map_err(|error| MutationError::Eval { index, error })
    }

    fn eval_pointer(
        &mut self,
        expression: &CompiledExpression,
        activation: &dyn Activation,
    ) -> Result<JsonPointer, MutationError> {
        match self.eval(expression, activation)? {
            Value::String(s) => JsonPointer::parse(&s),
            v => Err(MutationError::InvalidValue(format!(
                "evaluated to {} but expected string",
                v.type_name()
            ))),
        }
    }
}

fn to_json(value: &Value) -> Result<JsonValue, MutationError> {
    value.to_json().map_err(|e| {
        MutationError::InvalidValue(format!(
            "valueExpression evaluated to a type that could not marshal to JSON: {e}"
        ))
    })
}

impl CompiledMutations {
    /// Runs the mutations in order, each one seeing the output of the previous.
    ///
    /// The budget is shared by the whole chain. Compile errors are reported before any mutation
    /// runs.
    pub fn apply(
        &self,
        object: JsonValue,
        old_object: Option<&JsonValue>,
        context: &CallContext,
        options: &EvalOptions,
        budget: i64,
    ) -> MutationOutcome {
        let mut outcome = MutationOutcome {
            object,
            remaining_budget: budget,
            error: None,
        };
        for (index, mutator) in self.mutators.iter().enumerate() {
            if let Some(error) = mutator.error() {
                outcome.error = Some(MutationError::Compile {
                    index,
                    error: error.clone(),
                });
                return outcome;
            }
        }

        let schema = self.schema.as_deref();
        let old = old_object.map_or(Value::Null, |o| object_value(schema, o));
        for (index, mutator) in self.mutators.iter().enumerate() {
            if outcome.remaining_budget <= 0 {
                warn!(index, "mutation cost budget exhausted");
                outcome.remaining_budget = -1;
                outcome.error = Some(MutationError::BudgetExceeded { index });
                return outcome;
            }
            let activation = context
                .activation()
                .with(OBJECT_VAR, object_value(schema, &outcome.object))
                .with(OLD_OBJECT_VAR, old.clone());
            let mut evaluator = Evaluator {
                options,
                index,
                remaining: outcome.remaining_budget,
            };
            let result = match mutator {
                CompiledMutator::JsonPatch(ops) => {
                    self.json_patch(ops, &outcome.object, &activation, &mut evaluator)
                }
                CompiledMutator::ApplyConfiguration(expression) => self.apply_configuration(
                    expression,
                    &outcome.object,
                    &activation,
                    &mut evaluator,
                ),
            };
            outcome.remaining_budget = evaluator.remaining;
            match result {
                Ok(object) => {
                    debug!(
                        index,
                        kind = mutator.kind(),
                        remaining = outcome.remaining_budget,
                        "applied mutation"
                    );
                    outcome.object = object;
                }
                Err(error) => {
                    debug!(index, kind = mutator.kind(), %error, "mutation failed");
                    outcome.error = Some(error);
                    return outcome;
                }
            }
        }
        outcome
    }

    fn json_patch(
        &self,
        ops: &[CompiledPatchOperation],
        object: &JsonValue,
        activation: &dyn Activation,
        evaluator: &mut Evaluator<'_>,
    ) -> Result<JsonValue, MutationError> {
        let mut patch = Vec::with_capacity(ops.len());
        for op in ops {
            let path = evaluator.eval_pointer(&op.path, activation)?;
            let from = match &op.from {
                Some(from) => Some(evaluator.eval_pointer(from, activation)?),
                None => None,
            };
            let value = match &op.value {
                Some(expression) => {
                    let value = evaluator.eval(expression, activation)?;
                    if let Value::Object(literal) = &value {
                        let expected = self
                            .schema
                            .as_deref()
                            .and_then(|s| object_type_name_at_path(s, &path));
                        if let Some(expected) = expected {
                            if literal.type_name.as_ref() != expected {
                                return Err(MutationError::TypeMismatch(format!(
                                    "path {path} points to type {expected} but valueExpression evaluates to type {}",
                                    literal.type_name
                                )));
                            }
                        }
                        check_type_names(&value, &literal.type_name)?;
                    }
                    Some(to_json(&value)?)
                }
                None => None,
            };
            patch.push(PatchOperation {
                op: op.op,
                path,
                from,
                value,
            });
        }
        match apply_patch(object, &patch)? {
            PatchOutcome::Applied(patched) => Ok(patched),
            PatchOutcome::TestFailed => {
                trace!("json patch test failed, object left unchanged");
                Ok(object.clone())
            }
        }
    }

    fn apply_configuration(
        &self,
        expression: &CompiledExpression,
        object: &JsonValue,
        activation: &dyn Activation,
        evaluator: &mut Evaluator<'_>,
    ) -> Result<JsonValue, MutationError> {
        let schema = self.schema.as_deref().ok_or(MutationError::MissingSchema)?;
        let value = evaluator.eval(expression, activation)?;
        let Value::Object(_) = &value else {
            return Err(MutationError::InvalidValue(format!(
                "unsupported return type from apply configuration expression: {}",
                value.type_name()
            )));
        };
        check_type_names(&value, ROOT_TYPE_NAME)?;
        apply_configuration(schema, object, &to_json(&value)?)
    }
}
