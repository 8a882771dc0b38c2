// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The evaluator contract: compile source against a type environment, then evaluate the
//! program against an activation, reporting the actual cost of the call.

use crate::activation::Activation;
use crate::ast::Expr;
use crate::checker::{Checked, Checker, TypeEnv};
use crate::error::{CompileError, EvalError};
use crate::interpreter::{CostTracker, Interpreter};
use crate::lexer::Source;
use crate::parser::Parser;
use crate::types::DeclType;
use crate::utils::limits::{ExecutionTimer, ExecutionTimerConfig};
use crate::value::Value;

use core::fmt;
use core::num::NonZeroU32;
use core::time::Duration;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Limits applied to a single evaluation.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Per-call cost ceiling.
    pub cost_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    /// Work units between deadline and cancellation checks.
    pub check_interval: NonZeroU32,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            cost_limit: None,
            time_limit: None,
            check_interval: NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN),
            cancel: None,
        }
    }
}

impl EvalOptions {
    pub fn timer(&self) -> ExecutionTimer {
        let config = self.time_limit.map(|limit| ExecutionTimerConfig {
            limit,
            check_interval: self.check_interval,
        });
        let timer = ExecutionTimer::new(config);
        match &self.cancel {
            Some(flag) => timer.with_cancellation(flag.clone(), self.check_interval),
            None => timer,
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone)]
pub struct EvalDetails {
    pub result: Result<Value, EvalError>,
    /// `None` when the evaluator could not account for the call.
    pub actual_cost: Option<u64>,
}

pub trait Program: Send + Sync + fmt::Debug {
    fn eval(&self, activation: &dyn Activation, options: &EvalOptions) -> EvalDetails;

    fn output_type(&self) -> &DeclType;

    /// Root variables referenced by the program.
    fn references(&self) -> &BTreeSet<String>;

    fn source(&self) -> &str;
}

pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, source: &str, env: &TypeEnv) -> Result<Arc<dyn Program>, CompileError>;
}

/// Compiler for the built-in expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct CelCompiler;

impl ExpressionCompiler for CelCompiler {
    fn compile(&self, source: &str, env: &TypeEnv) -> Result<Arc<dyn Program>, CompileError> {
        Ok(Arc::new(CelProgram::compile(source, env)?))
    }
}

#[derive(Debug)]
pub struct CelProgram {
    source: String,
    expr: Expr,
    checked: Checked,
}

impl CelProgram {
    pub fn compile(source: &str, env: &TypeEnv) -> Result<Self, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::EmptyRule);
        }
        let src = Source::from_contents("<input>".to_string(), source.to_string())
            .map_err(|e| CompileError::Parse(e.to_string()))?;
        let expr = Parser::parse(&src).map_err(|e| CompileError::Parse(e.to_string()))?;
        let checked = Checker::check(env, &expr).map_err(|e| CompileError::Check(e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            expr,
            checked,
        })
    }
}

impl Program for CelProgram {
    fn eval(&self, activation: &dyn Activation, options: &EvalOptions) -> EvalDetails {
        let mut cost = CostTracker::new(options.cost_limit, options.timer());
        let result = Interpreter::new(activation, &mut cost).eval(&self.expr);
        EvalDetails {
            result,
            actual_cost: Some(cost.actual()),
        }
    }

    fn output_type(&self) -> &DeclType {
        &self.checked.output
    }

    fn references(&self) -> &BTreeSet<String> {
        &self.checked.references
    }

    fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::MapActivation;

    #[test]
    fn reports_cost_on_failure() {
        let env = TypeEnv::new().with_var("x", DeclType::INT);
        let program = CelCompiler.compile("x / 0 == 1", &env).unwrap();
        let details = program.eval(
            &MapActivation::new().with("x", Value::Int(4)),
            &EvalOptions::default(),
        );
        assert_eq!(details.result, Err(EvalError::DivisionByZero));
        assert!(details.actual_cost.unwrap() > 0);
    }

    #[test]
    fn enforces_cost_limit() {
        let env = TypeEnv::new().with_var("xs", DeclType::list(DeclType::INT));
        let program = CelCompiler
            .compile("xs.all(a, xs.all(b, a + b >= 0))", &env)
            .unwrap();
        let xs = Value::from((0..50).map(Value::Int).collect::<Vec<_>>());
        let options = EvalOptions {
            cost_limit: Some(100),
            ..EvalOptions::default()
        };
        let details = program.eval(&MapActivation::new().with("xs", xs), &options);
        assert_eq!(details.result, Err(EvalError::CostLimitExceeded));
    }

    #[test]
    fn honors_cancellation() {
        let env = TypeEnv::new().with_var("xs", DeclType::list(DeclType::INT));
        let program = CelCompiler.compile("xs.all(a, a >= 0)", &env).unwrap();
        let options = EvalOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            check_interval: NonZeroU32::MIN,
            ..EvalOptions::default()
        };
        let xs = Value::from(vec![Value::Int(1); 10]);
        let details = program.eval(&MapActivation::new().with("xs", xs), &options);
        assert!(matches!(details.result, Err(EvalError::Interrupted(_))));
    }

    #[test]
    fn long_operator_chains_are_compile_errors() {
        let env = TypeEnv::new();
        for source in [
            format!("1{} > 0", " + 1".repeat(1_000)),
            format!("{}true", "!".repeat(5_000)),
            format!("true{}", " && true".repeat(1_000)),
            format!("[[0]]{}", "[0]".repeat(1_000)),
        ] {
            assert!(matches!(
                CelCompiler.compile(&source, &env),
                Err(CompileError::Parse(_))
            ));
        }
        assert!(CelCompiler
            .compile(&format!("1{} > 0", " + 1".repeat(50)), &env)
            .is_ok());
    }

    #[test]
    fn oversized_source_is_rejected() {
        let source = format!("'{}' != ''", "a".repeat(crate::parser::MAX_EXPRESSION_SIZE));
        let err = CelCompiler.compile(&source, &TypeEnv::new()).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"), "{err}");
    }

    #[test]
    fn empty_source_is_rejected() {
        assert_eq!(
            CelCompiler.compile("  ", &TypeEnv::new()).unwrap_err(),
            CompileError::EmptyRule
        );
    }
}
