// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Static type checking of parsed expressions against declared variables.

use crate::ast::*;
use crate::builtins;
use crate::lexer::Span;
use crate::types::{DeclType, ObjectType, ScalarType};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Result};

/// Variables and named object types visible to an expression.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    vars: BTreeMap<String, DeclType>,
    types: BTreeMap<String, Arc<ObjectType>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable. Object types reachable from `ty` become usable in object literals.
    pub fn declare(&mut self, name: &str, ty: DeclType) {
        self.register_types(&ty);
        self.vars.insert(name.to_string(), ty);
    }

    pub fn with_var(mut self, name: &str, ty: DeclType) -> Self {
        self.declare(name, ty);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&DeclType> {
        self.vars.get(name)
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Arc<ObjectType>> {
        self.types.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &DeclType)> {
        self.vars.iter()
    }

    fn register_types(&mut self, ty: &DeclType) {
        match ty {
            DeclType::Object(o) => {
                if self.types.contains_key(&o.name) {
                    return;
                }
                self.types.insert(o.name.clone(), o.clone());
                for field in o.fields.values() {
                    self.register_types(&field.ty);
                }
            }
            DeclType::List(elem) => self.register_types(elem),
            DeclType::Map(k, v) => {
                self.register_types(k);
                self.register_types(v);
            }
            _ => (),
        }
    }
}

/// Result of checking an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Checked {
    pub output: DeclType,
    /// Declared variables referenced by the expression.
    pub references: BTreeSet<String>,
}

pub struct Checker<'a> {
    env: &'a TypeEnv,
    scopes: Vec<(String, DeclType)>,
    references: BTreeSet<String>,
}

fn is_numeric(ty: &DeclType) -> bool {
    [ScalarType::Int, ScalarType::Uint, ScalarType::Double]
        .iter()
        .any(|s| ty.is_scalar(*s))
}

fn is_bool(ty: &DeclType) -> bool {
    ty.is_dyn_like() || ty.is_scalar(ScalarType::Bool)
}

impl<'a> Checker<'a> {
    pub fn check(env: &'a TypeEnv, expr: &Expr) -> Result<Checked> {
        let mut checker = Checker {
            env,
            scopes: vec![],
            references: BTreeSet::new(),
        };
        let output = checker.check_expr(expr)?;
        Ok(Checked {
            output,
            references: checker.references,
        })
    }

    fn lookup_ident(&mut self, span: &Span) -> Result<DeclType> {
        let name = span.text();
        if let Some((_, ty)) = self.scopes.iter().rev().find(|(n, _)| n == name) {
            return Ok(ty.clone());
        }
        match self.env.lookup(name) {
            Some(ty) => {
                self.references.insert(name.to_string());
                Ok(ty.clone())
            }
            None => bail!(span.error(&format!("undeclared reference to '{name}'"))),
        }
    }

    fn check_select(&mut self, operand: &Expr, field: &Span, test_only: bool) -> Result<DeclType> {
        let operand_ty = self.check_expr(operand)?;
        let name = field.text();
        let ty = match &operand_ty {
            DeclType::Object(o) => match o.field(name) {
                Some(f) => f.ty.clone(),
                None if o.open => DeclType::DYN,
                None => bail!(field.error(&format!("undefined field '{name}'"))),
            },
            DeclType::Map(_, v) => v.as_ref().clone(),
            DeclType::Union(u) => match u.member(name) {
                Some(ty) => ty.clone(),
                None => bail!(field.error(&format!("undefined field '{name}'"))),
            },
            t if t.is_dyn() => DeclType::DYN,
            t => bail!(field.error(&format!("type '{t}' does not support field selection"))),
        };
        Ok(if test_only { DeclType::BOOL } else { ty })
    }

    fn check_index(&mut self, span: &Span, operand: &Expr, index: &Expr) -> Result<DeclType> {
        let operand_ty = self.check_expr(operand)?;
        let index_ty = self.check_expr(index)?;
        match &operand_ty {
            DeclType::List(elem) => {
                if !(index_ty.is_dyn_like() || is_numeric(&index_ty)) {
                    bail!(index
                        .span()
                        .error(&format!("list index must be int, found '{index_ty}'")));
                }
                Ok(elem.as_ref().clone())
            }
            DeclType::Map(k, v) => {
                if !k.is_assignable_from(&index_ty) {
                    bail!(index
                        .span()
                        .error(&format!("map key must be '{k}', found '{index_ty}'")));
                }
                Ok(v.as_ref().clone())
            }
            t if t.is_dyn_like() => Ok(DeclType::DYN),
            t => bail!(span.error(&format!("type '{t}' does not support indexing"))),
        }
    }

    fn check_call(
        &mut self,
        span: &Span,
        target: Option<&Ref<Expr>>,
        function: &Span,
        args: &[Ref<Expr>],
    ) -> Result<DeclType> {
        let target_ty = match target {
            Some(t) => Some(self.check_expr(t)?),
            None => None,
        };
        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args {
            arg_tys.push(self.check_expr(arg)?);
        }

        let name = function.text();
        if !builtins::BUILTINS.contains_key(name) {
            bail!(function.error(&format!("undeclared reference to '{name}'")));
        }
        let resolved = builtins::resolve(name, target_ty.as_ref(), &arg_tys);
        if let Some(((_, check, _), receiver, rest)) = resolved {
            if let Some(ty) = check(receiver, rest) {
                return Ok(ty);
            }
        }

        let receiver = target_ty.map(|t| format!("{t}.")).unwrap_or_default();
        let args = arg_tys
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        bail!(span.error(&format!(
            "found no matching overload for '{name}' applied to '{receiver}({args})'"
        )))
    }

    fn check_object(
        &mut self,
        span: &Span,
        type_name: &str,
        fields: &[(Span, Ref<Expr>)],
    ) -> Result<DeclType> {
        let Some(object) = self.env.lookup_type(type_name).cloned() else {
            bail!(span.error(&format!("undeclared reference to '{type_name}'")));
        };
        for (name, value) in fields {
            let value_ty = self.check_expr(value)?;
            let Some(field) = object.field(name.text()) else {
                bail!(name.error(&format!(
                    "undefined field '{}' on type '{type_name}'",
                    name.text()
                )));
            };
            if !field.ty.is_assignable_from(&value_ty) && !value_ty.is_scalar(ScalarType::Null) {
                bail!(value.span().error(&format!(
                    "expected type '{}' for field '{}', found '{value_ty}'",
                    field.ty,
                    name.text()
                )));
            }
        }
        Ok(DeclType::Object(object))
    }

    fn check_arith(
        &mut self,
        span: &Span,
        op: ArithOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<DeclType> {
        use ScalarType as S;
        let l = self.check_expr(lhs)?;
        let r = self.check_expr(rhs)?;
        if l.is_dyn_like() || r.is_dyn_like() {
            return Ok(DeclType::DYN);
        }
        let result = match (op, &l, &r) {
            (ArithOp::Add, DeclType::List(a), DeclType::List(b)) => {
                Some(DeclType::list(a.join(b)))
            }
            (_, DeclType::Scalar(a), DeclType::Scalar(b)) => match (op, a, b) {
                (ArithOp::Add, S::String, S::String) | (ArithOp::Add, S::Bytes, S::Bytes) => {
                    Some(l.clone())
                }
                (ArithOp::Add | ArithOp::Sub, S::Duration, S::Duration) => {
                    Some(DeclType::DURATION)
                }
                (ArithOp::Add, S::Timestamp, S::Duration)
                | (ArithOp::Add, S::Duration, S::Timestamp)
                | (ArithOp::Sub, S::Timestamp, S::Duration) => Some(DeclType::TIMESTAMP),
                (ArithOp::Sub, S::Timestamp, S::Timestamp) => Some(DeclType::DURATION),
                (ArithOp::Mod, S::Double, S::Double) => None,
                (_, S::Int, S::Int) | (_, S::Uint, S::Uint) | (_, S::Double, S::Double) => {
                    Some(l.clone())
                }
                _ => None,
            },
            _ => None,
        };
        match result {
            Some(ty) => Ok(ty),
            None => bail!(span.error(&format!(
                "found no matching overload for '{}' applied to '({l}, {r})'",
                op.symbol()
            ))),
        }
    }

    fn check_compare(
        &mut self,
        span: &Span,
        op: BoolOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<DeclType> {
        let l = self.check_expr(lhs)?;
        let r = self.check_expr(rhs)?;
        let comparable = l.is_dyn_like()
            || r.is_dyn_like()
            || (is_numeric(&l) && is_numeric(&r))
            || match op {
                BoolOp::Eq | BoolOp::Ne => {
                    l.is_assignable_from(&r)
                        || l.is_scalar(ScalarType::Null)
                        || r.is_scalar(ScalarType::Null)
                }
                _ => {
                    l == r
                        && matches!(
                            l,
                            DeclType::Scalar(
                                ScalarType::Bool
                                    | ScalarType::String
                                    | ScalarType::Bytes
                                    | ScalarType::Duration
                                    | ScalarType::Timestamp
                            )
                        )
                }
            };
        if !comparable {
            bail!(span.error(&format!(
                "found no matching overload for '{}' applied to '({l}, {r})'",
                op.symbol()
            )));
        }
        Ok(DeclType::BOOL)
    }

    fn check_comprehension(
        &mut self,
        span: &Span,
        kind: ComprehensionKind,
        range: &Expr,
        var: &Span,
        filter: Option<&Ref<Expr>>,
        body: &Expr,
    ) -> Result<DeclType> {
        let range_ty = self.check_expr(range)?;
        let var_ty = match &range_ty {
            DeclType::List(elem) => elem.as_ref().clone(),
            DeclType::Map(key, _) => key.as_ref().clone(),
            t if t.is_dyn_like() => DeclType::DYN,
            t => bail!(range.span().error(&format!(
                "expression of type '{t}' cannot be the range of a comprehension"
            ))),
        };

        self.scopes.push((var.text().to_string(), var_ty.clone()));
        let result = self.check_comprehension_body(span, kind, filter, body, var_ty);
        self.scopes.pop();
        result
    }

    fn check_comprehension_body(
        &mut self,
        span: &Span,
        kind: ComprehensionKind,
        filter: Option<&Ref<Expr>>,
        body: &Expr,
        var_ty: DeclType,
    ) -> Result<DeclType> {
        if let Some(filter) = filter {
            let ty = self.check_expr(filter)?;
            if !is_bool(&ty) {
                bail!(filter.span().error("map() filter must be a bool expression"));
            }
        }
        let body_ty = self.check_expr(body)?;
        match kind {
            ComprehensionKind::All | ComprehensionKind::Exists | ComprehensionKind::ExistsOne => {
                if !is_bool(&body_ty) {
                    bail!(span.error(&format!(
                        "{}() predicate must be a bool expression, found '{body_ty}'",
                        kind.name()
                    )));
                }
                Ok(DeclType::BOOL)
            }
            ComprehensionKind::Map => Ok(DeclType::list(body_ty)),
            ComprehensionKind::Filter => {
                if !is_bool(&body_ty) {
                    bail!(span.error("filter() predicate must be a bool expression"));
                }
                Ok(DeclType::list(var_ty))
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<DeclType> {
        match expr {
            Expr::Null(_) => Ok(DeclType::NULL),
            Expr::Bool { .. } => Ok(DeclType::BOOL),
            Expr::Int { .. } => Ok(DeclType::INT),
            Expr::Uint { .. } => Ok(DeclType::UINT),
            Expr::Double { .. } => Ok(DeclType::DOUBLE),
            Expr::String { .. } => Ok(DeclType::STRING),
            Expr::Bytes { .. } => Ok(DeclType::BYTES),
            Expr::Ident(span) => self.lookup_ident(span),
            Expr::Select {
                operand,
                field,
                test_only,
                ..
            } => self.check_select(operand, field, *test_only),
            Expr::Index {
                span,
                operand,
                index,
            } => self.check_index(span, operand, index),
            Expr::Call {
                span,
                target,
                function,
                args,
            } => self.check_call(span, target.as_ref(), function, args),
            Expr::List { items, .. } => {
                let mut elem: Option<DeclType> = None;
                for item in items {
                    let ty = self.check_expr(item)?;
                    elem = Some(match elem {
                        Some(prev) => prev.join(&ty),
                        None => ty,
                    });
                }
                Ok(DeclType::list(elem.unwrap_or(DeclType::DYN)))
            }
            Expr::Map { entries, .. } => {
                let mut types: Option<(DeclType, DeclType)> = None;
                for (key, value) in entries {
                    let k = self.check_expr(key)?;
                    let v = self.check_expr(value)?;
                    types = Some(match types {
                        Some((pk, pv)) => (pk.join(&k), pv.join(&v)),
                        None => (k, v),
                    });
                }
                let (k, v) = types.unwrap_or((DeclType::DYN, DeclType::DYN));
                Ok(DeclType::map(k, v))
            }
            Expr::Object {
                span,
                type_name,
                fields,
            } => self.check_object(span, type_name, fields),
            Expr::Unary { span, op, expr } => {
                let ty = self.check_expr(expr)?;
                let ok = match op {
                    UnaryOp::Not => is_bool(&ty),
                    UnaryOp::Neg => {
                        ty.is_dyn_like()
                            || ty.is_scalar(ScalarType::Int)
                            || ty.is_scalar(ScalarType::Double)
                            || ty.is_scalar(ScalarType::Duration)
                    }
                };
                if !ok {
                    bail!(span.error(&format!(
                        "found no matching overload for '{}' applied to '({ty})'",
                        op.symbol()
                    )));
                }
                Ok(ty)
            }
            Expr::Arith { span, op, lhs, rhs } => self.check_arith(span, *op, lhs, rhs),
            Expr::Compare { span, op, lhs, rhs } => self.check_compare(span, *op, lhs, rhs),
            Expr::In {
                span,
                value,
                collection,
            } => {
                let value_ty = self.check_expr(value)?;
                let ok = match self.check_expr(collection)? {
                    DeclType::List(elem) => {
                        elem.is_assignable_from(&value_ty)
                            || (is_numeric(&elem) && is_numeric(&value_ty))
                    }
                    DeclType::Map(key, _) => key.is_assignable_from(&value_ty),
                    t => t.is_dyn_like(),
                };
                if !ok {
                    bail!(span.error("found no matching overload for '@in'"));
                }
                Ok(DeclType::BOOL)
            }
            Expr::And { lhs, rhs, .. } | Expr::Or { lhs, rhs, .. } => {
                for side in [lhs, rhs] {
                    let ty = self.check_expr(side)?;
                    if !is_bool(&ty) {
                        bail!(side
                            .span()
                            .error(&format!("expected bool operand, found '{ty}'")));
                    }
                }
                Ok(DeclType::BOOL)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => {
                let cond_ty = self.check_expr(cond)?;
                if !is_bool(&cond_ty) {
                    bail!(cond
                        .span()
                        .error(&format!("conditional must be bool, found '{cond_ty}'")));
                }
                let then_ty = self.check_expr(then)?;
                let otherwise_ty = self.check_expr(otherwise)?;
                Ok(then_ty.join(&otherwise_ty))
            }
            Expr::Comprehension {
                span,
                kind,
                range,
                var,
                filter,
                body,
            } => self.check_comprehension(span, *kind, range, var, filter.as_ref(), body),
        }
    }
}
