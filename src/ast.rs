// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::*;

use core::{cmp, fmt, ops::Deref};
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "_+_",
            Self::Sub => "_-_",
            Self::Mul => "_*_",
            Self::Div => "_/_",
            Self::Mod => "_%_",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoolOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl BoolOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "_<_",
            Self::Le => "_<=_",
            Self::Eq => "_==_",
            Self::Ge => "_>=_",
            Self::Gt => "_>_",
            Self::Ne => "_!=_",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Not => "!_",
            Self::Neg => "-_",
        }
    }
}

/// Macro forms expanded into comprehensions.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ComprehensionKind {
    All,
    Exists,
    ExistsOne,
    Map,
    Filter,
}

impl ComprehensionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Exists => "exists",
            Self::ExistsOne => "exists_one",
            Self::Map => "map",
            Self::Filter => "filter",
        }
    }
}

pub struct NodeRef<T> {
    r: Arc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.r).eq(&Arc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Arc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

#[derive(Debug)]
pub enum Expr {
    Null(Span),
    Bool {
        span: Span,
        value: bool,
    },
    Int {
        span: Span,
        value: i64,
    },
    Uint {
        span: Span,
        value: u64,
    },
    Double {
        span: Span,
        value: f64,
    },
    String {
        span: Span,
        value: Arc<str>,
    },
    Bytes {
        span: Span,
        value: Arc<[u8]>,
    },

    Ident(Span),

    /// `operand.field`, or `has(operand.field)` when `test_only` is set.
    Select {
        span: Span,
        operand: Ref<Expr>,
        field: Span,
        test_only: bool,
    },

    Index {
        span: Span,
        operand: Ref<Expr>,
        index: Ref<Expr>,
    },

    /// Global call `f(args)` or receiver call `target.f(args)`.
    Call {
        span: Span,
        target: Option<Ref<Expr>>,
        function: Span,
        args: Vec<Ref<Expr>>,
    },

    List {
        span: Span,
        items: Vec<Ref<Expr>>,
    },

    Map {
        span: Span,
        entries: Vec<(Ref<Expr>, Ref<Expr>)>,
    },

    /// `Object.spec{field: value}`.
    Object {
        span: Span,
        type_name: String,
        fields: Vec<(Span, Ref<Expr>)>,
    },

    Unary {
        span: Span,
        op: UnaryOp,
        expr: Ref<Expr>,
    },

    Arith {
        span: Span,
        op: ArithOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
    },

    Compare {
        span: Span,
        op: BoolOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
    },

    In {
        span: Span,
        value: Ref<Expr>,
        collection: Ref<Expr>,
    },

    And {
        span: Span,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
    },

    Or {
        span: Span,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
    },

    Conditional {
        span: Span,
        cond: Ref<Expr>,
        then: Ref<Expr>,
        otherwise: Ref<Expr>,
    },

    Comprehension {
        span: Span,
        kind: ComprehensionKind,
        range: Ref<Expr>,
        var: Span,
        /// Filter predicate of the three argument `map` form.
        filter: Option<Ref<Expr>>,
        body: Ref<Expr>,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Null(span) | Expr::Ident(span) => span,
            Expr::Bool { span, .. }
            | Expr::Int { span, .. }
            | Expr::Uint { span, .. }
            | Expr::Double { span, .. }
            | Expr::String { span, .. }
            | Expr::Bytes { span, .. }
            | Expr::Select { span, .. }
            | Expr::Index { span, .. }
            | Expr::Call { span, .. }
            | Expr::List { span, .. }
            | Expr::Map { span, .. }
            | Expr::Object { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Arith { span, .. }
            | Expr::Compare { span, .. }
            | Expr::In { span, .. }
            | Expr::And { span, .. }
            | Expr::Or { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Comprehension { span, .. } => span,
        }
    }
}
