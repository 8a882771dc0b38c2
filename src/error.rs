// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::path::FieldPath;

/// Errors produced while building types or compiling expressions.
///
/// Compile errors never abort a build. They are stored on the compiled artifact and surfaced as
/// field errors the first time the artifact is used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("type error: {0}")]
    Check(String),
    #[error("expression must evaluate to {expected} but evaluates to {found}")]
    OutputType { expected: String, found: String },
    #[error("property name `{name}` cannot be represented as an expression identifier")]
    Escape { name: String },
    #[error("schema type reference cycle detected at {path}")]
    CyclicType { path: String },
    #[error("expression is empty")]
    EmptyRule,
    #[error("environment error: {0}")]
    Environment(String),
}

/// Errors raised while evaluating a compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),
    #[error("no such key: {0}")]
    NoSuchKey(String),
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0} overflow")]
    Overflow(&'static str),
    #[error("no such overload: {0}")]
    NoSuchOverload(String),
    #[error("operation cancelled: actual cost limit exceeded")]
    CostLimitExceeded,
    #[error("operation interrupted: {0}")]
    Interrupted(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn is_no_such_overload(&self) -> bool {
        matches!(self, Self::NoSuchOverload(_))
    }

    /// Cost and interrupt errors stop the whole call, not just the failing rule.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CostLimitExceeded | Self::Interrupted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FieldErrorKind {
    Invalid,
    Required,
    Forbidden,
    Duplicate,
    NotSupported,
    Internal,
    BudgetExceeded,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "Invalid value",
            Self::Required => "Required value",
            Self::Forbidden => "Forbidden",
            Self::Duplicate => "Duplicate value",
            Self::NotSupported => "Unsupported value",
            Self::Internal => "Internal error",
            Self::BudgetExceeded => "Invalid value",
        })
    }
}

/// A validation failure scoped to a field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FieldError {
    pub path: FieldPath,
    pub kind: FieldErrorKind,
    pub detail: String,
}

impl FieldError {
    pub fn new(path: FieldPath, kind: FieldErrorKind, detail: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(path.clone(), FieldErrorKind::Invalid, detail)
    }

    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(path.clone(), FieldErrorKind::Required, detail)
    }

    pub fn internal(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(path.clone(), FieldErrorKind::Internal, detail)
    }

    pub fn not_supported(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(path.clone(), FieldErrorKind::NotSupported, detail)
    }

    pub fn budget_exceeded(path: &FieldPath) -> Self {
        Self::new(
            path.clone(),
            FieldErrorKind::BudgetExceeded,
            "validation failed due to running out of cost budget, no further validation rules will be run",
        )
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.detail)
    }
}

/// Ordered collection of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }

    /// Returns true if any error reports budget exhaustion.
    pub fn has_budget_error(&self) -> bool {
        self.0
            .iter()
            .any(|e| e.kind == FieldErrorKind::BudgetExceeded)
    }
}

impl From<Vec<FieldError>> for FieldErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = core::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => Ok(()),
            1 => write!(f, "{}", self.0[0]),
            _ => {
                f.write_str("[")?;
                for (idx, err) in self.0.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{err}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Errors raised while matching a request against match criteria.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("invalid label selector: {0}")]
    InvalidSelector(String),
    #[error("invalid rule: {0}")]
    InvalidRule(FieldErrors),
}

/// Errors raised by the mutation chain. Any error rejects the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("mutation {index} failed to compile: {error}")]
    Compile { index: usize, error: CompileError },
    #[error("mutation {index} evaluation failed: {error}")]
    Eval { index: usize, error: EvalError },
    #[error("mutation {index} ran out of cost budget")]
    BudgetExceeded { index: usize },
    #[error("invalid JSON pointer `{pointer}`: {reason}")]
    InvalidPointer { pointer: String, reason: String },
    #[error("json patch {op} failed at `{path}`: {reason}")]
    Patch {
        op: String,
        path: String,
        reason: String,
    },
    #[error("may not mutate atomic arrays, maps or structs: {}", .paths.join(", "))]
    AtomicMutation { paths: Vec<String> },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("schema is required for apply configuration mutations")]
    MissingSchema,
    #[error("{0}")]
    InvalidValue(String),
}

/// Errors of an admission expression evaluated by a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("compilation error: {0}")]
    Compile(CompileError),
    #[error("expression '{expression}' resulted in error: {error}")]
    Eval { expression: String, error: EvalError },
    /// Stops the filter. No later expression is evaluated.
    #[error("validation failed due to running out of cost budget, no further validation rules will be run")]
    BudgetExceeded,
    /// Stops the filter. No later expression is evaluated.
    #[error("runtime cost could not be calculated for expression: {0}, no further expression will be run")]
    UnknownCost(String),
}

/// Errors raised while decoding a schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unresolved schema reference `{0}`")]
    UnresolvedRef(String),
    #[error("unsupported schema type `{0}`")]
    UnsupportedType(String),
    #[error("invalid schema at {path}: {reason}")]
    Invalid { path: String, reason: String },
}
