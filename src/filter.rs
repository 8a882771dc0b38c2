// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Admission expressions over a whole request, such as match conditions.
//!
//! The expressions of a filter are evaluated in order against `object`, `oldObject` and the call
//! context. They share one cost budget, and each one reports its own result and cost.

use crate::activation::{CallContext, OBJECT_VAR, OLD_OBJECT_VAR};
use crate::compiler::{CompiledExpression, OutputKind, RuleCompiler};
use crate::error::FilterError;
use crate::program::EvalOptions;
use crate::schema::Schema;
use crate::types::{object_value, resource_decl_type_for, DeclType};
use crate::value::Value;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{trace, warn};

/// Outcome of one expression of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub expression: String,
    pub result: Result<Value, FilterError>,
    /// Cost charged to the budget. Zero for expressions that did not run.
    pub cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// One entry per expression, in declared order.
    pub evaluations: Vec<Evaluation>,
    pub remaining_budget: i64,
}

/// Compiled admission expressions for one kind.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    schema: Option<Arc<Schema>>,
    expressions: Vec<CompiledExpression>,
}

impl CompiledFilter {
    /// Compiles `expressions`, each required to produce `output`. Without a schema `object` is
    /// untyped.
    pub fn new<S: AsRef<str>>(
        expressions: &[S],
        output: OutputKind,
        schema: Option<Arc<Schema>>,
        compiler: &RuleCompiler,
    ) -> Self {
        let object_type = match &schema {
            Some(schema) => resource_decl_type_for(schema, schema.root()),
            None => Ok(DeclType::DYN),
        };
        let env = object_type.map(|ty| compiler.admission_env(&ty));
        let expressions = expressions
            .iter()
            .map(|source| match &env {
                Ok(env) => compiler.compile(source.as_ref(), env, output),
                Err(e) => CompiledExpression::failed(source.as_ref(), e.clone()),
            })
            .collect();
        Self {
            schema,
            expressions,
        }
    }

    pub fn expressions(&self) -> &[CompiledExpression] {
        &self.expressions
    }

    /// Evaluates every expression in order.
    ///
    /// Compile and evaluation errors are reported per expression. Running out of budget, or an
    /// expression whose cost is unknown, stops the filter with an error.
    pub fn evaluate(
        &self,
        object: Option<&JsonValue>,
        old_object: Option<&JsonValue>,
        context: &CallContext,
        options: &EvalOptions,
        budget: i64,
    ) -> Result<FilterOutcome, FilterError> {
        let schema = self.schema.as_deref();
        let value =
            |json: Option<&JsonValue>| json.map_or(Value::Null, |o| object_value(schema, o));
        let activation = context
            .activation()
            .with(OBJECT_VAR, value(object))
            .with(OLD_OBJECT_VAR, value(old_object));

        let mut remaining = budget;
        let mut evaluations = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            let source = expression.source().to_string();
            let Some(program) = expression.program() else {
                let error = match expression.error() {
                    Some(e) => FilterError::Compile(e.clone()),
                    None => FilterError::UnknownCost(source.clone()),
                };
                evaluations.push(Evaluation {
                    expression: source,
                    result: Err(error),
                    cost: 0,
                });
                continue;
            };
            let details = program.eval(&activation, options);
            let Some(cost) = details.actual_cost else {
                return Err(FilterError::UnknownCost(source));
            };
            trace!(expression = %source, cost, "evaluated filter expression");
            if i64::try_from(cost).map_or(true, |c| c > remaining) {
                warn!(expression = %source, cost, remaining, "filter cost budget exhausted");
                return Err(FilterError::BudgetExceeded);
            }
            remaining -= cost as i64;
            let result = details.result.map_err(|error| FilterError::Eval {
                expression: source.clone(),
                error,
            });
            evaluations.push(Evaluation {
                expression: source,
                result,
                cost,
            });
        }
        Ok(FilterOutcome {
            evaluations,
            remaining_budget: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, EvalError};
    use crate::request::{AdmissionRequest, Operation};
    use serde_json::json;

    fn deployment_schema() -> Arc<Schema> {
        Arc::new(
            Schema::from_json(&json!({
                "type": "object",
                "properties": {
                    "metadata": {"type": "object"},
                    "spec": {
                        "type": "object",
                        "properties": {"replicas": {"type": "integer"}}
                    }
                }
            }))
            .unwrap(),
        )
    }

    fn context() -> CallContext {
        let request = AdmissionRequest {
            operation: Operation::Update,
            ..AdmissionRequest::default()
        };
        CallContext {
            request: Some(request.to_value()),
            ..CallContext::default()
        }
    }

    #[test]
    fn evaluates_in_order() {
        let filter = CompiledFilter::new(
            &[
                "object.spec.replicas > oldObject.spec.replicas",
                "request.operation == 'UPDATE'",
                "params == null && namespaceObject == null",
            ],
            OutputKind::Bool,
            Some(deployment_schema()),
            &RuleCompiler::default(),
        );
        let outcome = filter
            .evaluate(
                Some(&json!({"spec": {"replicas": 3}})),
                Some(&json!({"spec": {"replicas": 2}})),
                &context(),
                &EvalOptions::default(),
                1_000,
            )
            .unwrap();
        let results: Vec<_> = outcome.evaluations.iter().map(|e| e.result.clone()).collect();
        assert_eq!(results, vec![Ok(Value::Bool(true)); 3]);
        let spent: u64 = outcome.evaluations.iter().map(|e| e.cost).sum();
        assert!(spent > 0);
        assert_eq!(outcome.remaining_budget, 1_000 - spent as i64);
    }

    #[test]
    fn errors_are_per_expression() {
        let filter = CompiledFilter::new(
            &["object.spec.replicas / 0 == 1", "object.spec.replicas +", "true"],
            OutputKind::Bool,
            Some(deployment_schema()),
            &RuleCompiler::default(),
        );
        let outcome = filter
            .evaluate(
                Some(&json!({"spec": {"replicas": 3}})),
                None,
                &context(),
                &EvalOptions::default(),
                1_000,
            )
            .unwrap();
        assert!(matches!(
            &outcome.evaluations[0].result,
            Err(FilterError::Eval {
                error: EvalError::DivisionByZero,
                ..
            })
        ));
        assert!(matches!(
            &outcome.evaluations[1].result,
            Err(FilterError::Compile(CompileError::Parse(_)))
        ));
        assert_eq!(outcome.evaluations[1].cost, 0);
        assert_eq!(outcome.evaluations[2].result, Ok(Value::Bool(true)));
    }

    #[test]
    fn output_type_is_enforced() {
        let filter = CompiledFilter::new(
            &["object.spec.replicas"],
            OutputKind::Bool,
            Some(deployment_schema()),
            &RuleCompiler::default(),
        );
        assert!(matches!(
            filter.expressions()[0].error(),
            Some(CompileError::OutputType { .. })
        ));
    }

    #[test]
    fn budget_is_shared() {
        let filter = CompiledFilter::new(
            &["object.xs.all(x, x > 0)", "object.xs.all(x, x > 0)"],
            OutputKind::Bool,
            None,
            &RuleCompiler::default(),
        );
        let object = json!({"xs": [1, 2, 3, 4, 5]});
        let run = |budget| {
            filter.evaluate(
                Some(&object),
                None,
                &CallContext::default(),
                &EvalOptions::default(),
                budget,
            )
        };
        let first = run(1_000).unwrap();
        let cost = first.evaluations[0].cost as i64;
        assert_eq!(first.remaining_budget, 1_000 - 2 * cost);

        // Enough for exactly one expression.
        assert_eq!(run(2 * cost - 1), Err(FilterError::BudgetExceeded));
        assert_eq!(run(2 * cost).unwrap().remaining_budget, 0);
        assert_eq!(run(0), Err(FilterError::BudgetExceeded));
    }
}
