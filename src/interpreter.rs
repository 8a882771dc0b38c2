// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::activation::Activation;
use crate::ast::*;
use crate::builtins;
use crate::error::EvalError;
use crate::types::unescape;
use crate::utils::limits::ExecutionTimer;
use crate::value::{ObjectValue, Value};

use core::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;

/// Cost of an operation over `size` elements or bytes.
pub fn size_cost(size: usize) -> u64 {
    (size as u64).div_ceil(10)
}

/// Accumulates the actual cost of one evaluation and enforces its limits.
#[derive(Debug)]
pub struct CostTracker {
    limit: Option<u64>,
    actual: u64,
    timer: ExecutionTimer,
}

impl CostTracker {
    pub fn new(limit: Option<u64>, mut timer: ExecutionTimer) -> Self {
        timer.start(crate::utils::limits::monotonic_now());
        Self {
            limit,
            actual: 0,
            timer,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, ExecutionTimer::new(None))
    }

    pub fn actual(&self) -> u64 {
        self.actual
    }

    pub fn charge(&mut self, units: u64) -> Result<(), EvalError> {
        self.actual = self.actual.saturating_add(units);
        if let Some(limit) = self.limit {
            if self.actual > limit {
                return Err(EvalError::CostLimitExceeded);
            }
        }
        self.timer
            .tick(u32::try_from(units).unwrap_or(u32::MAX))
            .map_err(|e| EvalError::Interrupted(e.to_string()))
    }

    pub fn charge_size(&mut self, size: usize) -> Result<(), EvalError> {
        self.charge(size_cost(size))
    }
}

/// Tree walking evaluator for checked expressions.
pub struct Interpreter<'a> {
    activation: &'a dyn Activation,
    locals: Vec<(String, Value)>,
    cost: &'a mut CostTracker,
}

/// CEL equality: NaN is never equal to anything and values of different kinds are unequal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(x), _) if x.is_nan() => false,
        (_, Value::Double(y)) if y.is_nan() => false,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        _ => a == b,
    }
}

fn compare(op: BoolOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Uint(_) | Value::Double(_));
    let same_kind = core::mem::discriminant(a) == core::mem::discriminant(b);
    let orderable = matches!(
        a,
        Value::Bool(_)
            | Value::String(_)
            | Value::Bytes(_)
            | Value::Duration(_)
            | Value::Timestamp(_)
    );
    if !((numeric(a) && numeric(b)) || (same_kind && orderable)) {
        return Err(EvalError::NoSuchOverload(format!(
            "{} applied to ({}, {})",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )));
    }
    if matches!(a, Value::Double(d) if d.is_nan()) || matches!(b, Value::Double(d) if d.is_nan()) {
        return Ok(false);
    }
    let ord = a.cmp(b);
    Ok(match op {
        BoolOp::Lt => ord == Ordering::Less,
        BoolOp::Le => ord != Ordering::Greater,
        BoolOp::Gt => ord == Ordering::Greater,
        BoolOp::Ge => ord != Ordering::Less,
        BoolOp::Eq => ord == Ordering::Equal,
        BoolOp::Ne => ord != Ordering::Equal,
    })
}

fn no_overload(op: &str, a: &Value, b: &Value) -> EvalError {
    EvalError::NoSuchOverload(format!("{op} applied to ({}, {})", a.type_name(), b.type_name()))
}

fn list_index(items: &[Value], index: &Value) -> Result<Value, EvalError> {
    let idx = match index {
        Value::Int(i) => usize::try_from(*i).ok(),
        Value::Uint(u) => usize::try_from(*u).ok(),
        Value::Double(d) if d.fract() == 0.0 && *d >= 0.0 => Some(*d as usize),
        v => {
            return Err(EvalError::NoSuchOverload(format!(
                "list index applied to {}",
                v.type_name()
            )))
        }
    };
    idx.and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| EvalError::IndexOutOfRange(index.to_string()))
}

impl<'a> Interpreter<'a> {
    pub fn new(activation: &'a dyn Activation, cost: &'a mut CostTracker) -> Self {
        Self {
            activation,
            locals: vec![],
            cost,
        }
    }

    /// Evaluates `expr`, charging its cost to the tracker.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_expr(expr)
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, v)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        self.activation
            .resolve(name)
            .ok_or_else(|| EvalError::NoSuchAttribute(name.to_string()))
    }

    fn eval_select(
        &mut self,
        operand: &Expr,
        field: &str,
        test_only: bool,
    ) -> Result<Value, EvalError> {
        let value = self.eval_expr(operand)?;
        let found = match &value {
            Value::Map(m) => m
                .get(&Value::from(field))
                .or_else(|| m.get(&Value::from(unescape(field))))
                .cloned(),
            Value::Object(o) => o
                .fields
                .get(field)
                .or_else(|| o.fields.get(unescape(field).as_str()))
                .cloned(),
            Value::Int(_) if field == "intVal" => Some(value.clone()),
            Value::String(_) if field == "strVal" => Some(value.clone()),
            Value::Int(_) | Value::String(_) if matches!(field, "intVal" | "strVal") => None,
            v => {
                return Err(EvalError::NoSuchOverload(format!(
                    "field selection on {}",
                    v.type_name()
                )))
            }
        };
        match (found, test_only) {
            (found, true) => Ok(Value::Bool(found.is_some())),
            (Some(v), false) => Ok(v),
            (None, false) => Err(EvalError::NoSuchKey(field.to_string())),
        }
    }

    fn eval_index(&mut self, operand: &Expr, index: &Expr) -> Result<Value, EvalError> {
        let value = self.eval_expr(operand)?;
        let index = self.eval_expr(index)?;
        match &value {
            Value::List(items) => list_index(items, &index),
            Value::Map(m) => m
                .get(&index)
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey(index.to_string())),
            Value::Object(o) => index
                .as_str()
                .and_then(|k| o.fields.get(k))
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey(index.to_string())),
            v => Err(no_overload("index", v, &index)),
        }
    }

    fn eval_call(
        &mut self,
        target: Option<&Ref<Expr>>,
        function: &str,
        args: &[Ref<Expr>],
    ) -> Result<Value, EvalError> {
        let target = match target {
            Some(t) => Some(self.eval_expr(t)?),
            None => None,
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }
        let Some(((_, _, fcn), receiver, rest)) =
            builtins::resolve(function, target.as_ref(), &values)
        else {
            return Err(EvalError::NoSuchOverload(function.to_string()));
        };
        fcn(self.cost, receiver, rest)
    }

    fn eval_arith(&mut self, op: ArithOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;
        let sym = op.symbol();
        let overflow = |t| EvalError::Overflow(t);
        Ok(match (op, &l, &r) {
            (ArithOp::Div | ArithOp::Mod, Value::Int(_), Value::Int(0))
            | (ArithOp::Div | ArithOp::Mod, Value::Uint(_), Value::Uint(0)) => {
                return Err(EvalError::DivisionByZero)
            }
            (_, Value::Int(a), Value::Int(b)) => Value::Int(
                match op {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                    ArithOp::Mul => a.checked_mul(*b),
                    ArithOp::Div => a.checked_div(*b),
                    ArithOp::Mod => a.checked_rem(*b),
                }
                .ok_or(overflow("int"))?,
            ),
            (_, Value::Uint(a), Value::Uint(b)) => Value::Uint(
                match op {
                    ArithOp::Add => a.checked_add(*b),
                    ArithOp::Sub => a.checked_sub(*b),
                    ArithOp::Mul => a.checked_mul(*b),
                    ArithOp::Div => a.checked_div(*b),
                    ArithOp::Mod => a.checked_rem(*b),
                }
                .ok_or(overflow("uint"))?,
            ),
            (ArithOp::Mod, Value::Double(_), Value::Double(_)) => {
                return Err(no_overload(sym, &l, &r))
            }
            (_, Value::Double(a), Value::Double(b)) => Value::Double(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                _ => a / b,
            }),
            (ArithOp::Add, Value::String(a), Value::String(b)) => {
                self.cost.charge_size(a.len() + b.len())?;
                Value::from(format!("{a}{b}"))
            }
            (ArithOp::Add, Value::Bytes(a), Value::Bytes(b)) => {
                self.cost.charge_size(a.len() + b.len())?;
                Value::Bytes(Arc::from([a.as_ref(), b.as_ref()].concat()))
            }
            (ArithOp::Add, Value::List(a), Value::List(b)) => {
                self.cost.charge_size(a.len() + b.len())?;
                Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>())
            }
            (ArithOp::Add, Value::Duration(a), Value::Duration(b)) => {
                Value::Duration(a.checked_add(b).ok_or(overflow("duration"))?)
            }
            (ArithOp::Sub, Value::Duration(a), Value::Duration(b)) => {
                Value::Duration(a.checked_sub(b).ok_or(overflow("duration"))?)
            }
            (ArithOp::Add, Value::Timestamp(t), Value::Duration(d))
            | (ArithOp::Add, Value::Duration(d), Value::Timestamp(t)) => Value::Timestamp(
                t.checked_add_signed(*d)
                    .ok_or(overflow("timestamp"))?,
            ),
            (ArithOp::Sub, Value::Timestamp(t), Value::Duration(d)) => Value::Timestamp(
                t.checked_sub_signed(*d)
                    .ok_or(overflow("timestamp"))?,
            ),
            (ArithOp::Sub, Value::Timestamp(a), Value::Timestamp(b)) => {
                Value::Duration(a.signed_duration_since(*b))
            }
            _ => return Err(no_overload(sym, &l, &r)),
        })
    }

    // Errors on one side are ignored when the other side decides the result.
    fn eval_logical(&mut self, lhs: &Expr, rhs: &Expr, is_and: bool) -> Result<Value, EvalError> {
        let decisive = !is_and;
        let left = self.eval_bool(lhs);
        match &left {
            Ok(b) if *b == decisive => return Ok(Value::Bool(decisive)),
            Err(e) if e.is_fatal() => return Err(e.clone()),
            _ => (),
        }
        match self.eval_bool(rhs)? {
            b if b == decisive => Ok(Value::Bool(decisive)),
            _ => left.map(|_| Value::Bool(!decisive)),
        }
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool, EvalError> {
        match self.eval_expr(expr)? {
            Value::Bool(b) => Ok(b),
            v => Err(EvalError::NoSuchOverload(format!(
                "expected bool, found {}",
                v.type_name()
            ))),
        }
    }

    fn eval_comprehension(
        &mut self,
        kind: ComprehensionKind,
        range: &Expr,
        var: &str,
        filter: Option<&Ref<Expr>>,
        body: &Expr,
    ) -> Result<Value, EvalError> {
        let items: Vec<Value> = match self.eval_expr(range)? {
            Value::List(items) => items.as_ref().clone(),
            Value::Map(m) => m.keys().cloned().collect(),
            v => {
                return Err(EvalError::NoSuchOverload(format!(
                    "{}() applied to {}",
                    kind.name(),
                    v.type_name()
                )))
            }
        };

        let mut deferred: Option<EvalError> = None;
        let mut matched = 0usize;
        let mut output = vec![];
        for item in items {
            self.cost.charge(1)?;
            self.locals.push((var.to_string(), item.clone()));
            let step = self.eval_step(kind, filter, body);
            self.locals.pop();

            match (kind, step) {
                (_, Err(e)) if e.is_fatal() => return Err(e),
                (ComprehensionKind::All, Ok(Some(Value::Bool(false)))) => {
                    return Ok(Value::Bool(false))
                }
                (ComprehensionKind::Exists, Ok(Some(Value::Bool(true)))) => {
                    return Ok(Value::Bool(true))
                }
                (ComprehensionKind::All | ComprehensionKind::Exists, Err(e)) => {
                    deferred.get_or_insert(e);
                }
                (_, Err(e)) => return Err(e),
                (ComprehensionKind::ExistsOne, Ok(Some(Value::Bool(true)))) => matched += 1,
                (ComprehensionKind::Map, Ok(Some(v))) => output.push(v),
                (ComprehensionKind::Filter, Ok(Some(Value::Bool(true)))) => output.push(item),
                (_, Ok(Some(Value::Bool(_)))) | (_, Ok(None)) => (),
                (_, Ok(Some(v))) => {
                    return Err(EvalError::NoSuchOverload(format!(
                        "{}() predicate returned {}",
                        kind.name(),
                        v.type_name()
                    )))
                }
            }
        }

        if let Some(e) = deferred {
            return Err(e);
        }
        Ok(match kind {
            ComprehensionKind::All => Value::Bool(true),
            ComprehensionKind::Exists => Value::Bool(false),
            ComprehensionKind::ExistsOne => Value::Bool(matched == 1),
            ComprehensionKind::Map | ComprehensionKind::Filter => Value::from(output),
        })
    }

    // Returns None when a map() filter skipped the element.
    fn eval_step(
        &mut self,
        kind: ComprehensionKind,
        filter: Option<&Ref<Expr>>,
        body: &Expr,
    ) -> Result<Option<Value>, EvalError> {
        if let (ComprehensionKind::Map, Some(filter)) = (kind, filter) {
            if !self.eval_bool(filter)? {
                return Ok(None);
            }
        }
        self.eval_expr(body).map(Some)
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.cost.charge(1)?;
        match expr {
            Expr::Null(_) => Ok(Value::Null),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Uint { value, .. } => Ok(Value::Uint(*value)),
            Expr::Double { value, .. } => Ok(Value::Double(*value)),
            Expr::String { value, .. } => Ok(Value::String(value.clone())),
            Expr::Bytes { value, .. } => Ok(Value::Bytes(value.clone())),
            Expr::Ident(span) => self.lookup(span.text()),
            Expr::Select {
                operand,
                field,
                test_only,
                ..
            } => self.eval_select(operand, field.text(), *test_only),
            Expr::Index { operand, index, .. } => self.eval_index(operand, index),
            Expr::Call {
                target,
                function,
                args,
                ..
            } => self.eval_call(target.as_ref(), function.text(), args),
            Expr::List { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::from(values))
            }
            Expr::Map { entries, .. } => {
                let mut m = BTreeMap::new();
                for (key, value) in entries {
                    let k = self.eval_expr(key)?;
                    let v = self.eval_expr(value)?;
                    if m.insert(k.clone(), v).is_some() {
                        return Err(EvalError::InvalidArgument(format!(
                            "Failed with repeated key: {k}"
                        )));
                    }
                }
                Ok(Value::from(m))
            }
            Expr::Object {
                type_name, fields, ..
            } => {
                let mut values = BTreeMap::new();
                for (name, value) in fields {
                    let v = self.eval_expr(value)?;
                    values.insert(Arc::from(unescape(name.text())), v);
                }
                Ok(Value::Object(Arc::new(ObjectValue {
                    type_name: Arc::from(type_name.as_str()),
                    fields: values,
                })))
            }
            Expr::Unary { op, expr, .. } => match (op, self.eval_expr(expr)?) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Neg, Value::Int(i)) => {
                    Ok(Value::Int(i.checked_neg().ok_or(EvalError::Overflow("int"))?))
                }
                (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
                (UnaryOp::Neg, Value::Duration(d)) => Ok(Value::Duration(
                    Duration::zero()
                        .checked_sub(&d)
                        .ok_or(EvalError::Overflow("duration"))?,
                )),
                (op, v) => Err(EvalError::NoSuchOverload(format!(
                    "{} applied to {}",
                    op.symbol(),
                    v.type_name()
                ))),
            },
            Expr::Arith { op, lhs, rhs, .. } => self.eval_arith(*op, lhs, rhs),
            Expr::Compare { op, lhs, rhs, .. } => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                match op {
                    BoolOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
                    BoolOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
                    _ => Ok(Value::Bool(compare(*op, &l, &r)?)),
                }
            }
            Expr::In {
                value, collection, ..
            } => {
                let v = self.eval_expr(value)?;
                match self.eval_expr(collection)? {
                    Value::List(items) => {
                        self.cost.charge_size(items.len())?;
                        Ok(Value::Bool(items.iter().any(|item| values_equal(item, &v))))
                    }
                    Value::Map(m) => Ok(Value::Bool(m.contains_key(&v))),
                    c => Err(no_overload("@in", &v, &c)),
                }
            }
            Expr::And { lhs, rhs, .. } => self.eval_logical(lhs, rhs, true),
            Expr::Or { lhs, rhs, .. } => self.eval_logical(lhs, rhs, false),
            Expr::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => {
                if self.eval_bool(cond)? {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                filter,
                body,
                ..
            } => self.eval_comprehension(*kind, range, var.text(), filter.as_ref(), body),
        }
    }
}
