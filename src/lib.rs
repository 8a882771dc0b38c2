// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod activation;
mod ast;
mod builtins;
mod checker;
mod compiler;
mod config;
mod engine;
mod error;
mod filter;
mod interpreter;
mod lexer;
mod parser;
mod path;
mod program;
mod request;
mod schema;
mod types;
mod utils;
mod value;

pub mod matcher;
pub mod mutation;
pub mod validator;

pub use activation::{Activation, CallContext, MapActivation};
pub use compiler::{CompiledExpression, CompiledRule, EnvOptions, OutputKind, RuleCompiler};
pub use config::EngineConfig;
pub use engine::{Engine, Validation};
pub use error::{
    CompileError, EvalError, FieldError, FieldErrorKind, FieldErrors, FilterError, MatchError,
    MutationError, SchemaError,
};
pub use filter::{CompiledFilter, Evaluation, FilterOutcome};
pub use path::{FieldPath, PathElement};
pub use program::{CelCompiler, EvalDetails, EvalOptions, ExpressionCompiler, Program};
pub use request::{
    AdmissionRequest, GroupVersionKind, GroupVersionResource, Operation, UserInfo,
};
pub use schema::{
    FailureReason, Kind, ListType, MapType, NodeId, Rule, Schema, SchemaNode, ValueValidations,
};
pub use types::{escape, unescape, DeclType, ObjectType, ScalarType};
pub use value::{ObjectValue, Value};

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::activation::*;
    pub use crate::ast::*;
    pub use crate::checker::*;
    pub use crate::lexer::*;
    pub use crate::parser::*;
    pub use crate::types::*;
}
