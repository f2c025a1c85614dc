//! Policy evaluation
//!
//! Values are JSON values. A missing input, or a rule whose definition does
//! not hold and has no default, is *undefined*: comparisons, arithmetic and
//! collections containing an undefined operand are undefined too. Logical
//! operators treat undefined as false, so an undefined condition never
//! holds. Type mismatches, division by zero and integer overflow are errors.

use crate::ast::{BinOp, Expr};
use crate::compiler::CompiledPolicy;
use crate::error::{PolicyError, PolicyResult};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A parsed `data.<package>.<rule>` query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    package: String,
    rule: String,
}

impl Query {
    pub fn parse(query: &str) -> PolicyResult<Self> {
        let parts: Vec<&str> = query.trim().split('.').collect();
        match parts.as_slice() {
            ["data", package, rule] if is_ident(package) && is_ident(rule) => Ok(Self {
                package: package.to_string(),
                rule: rule.to_string(),
            }),
            _ => Err(PolicyError::Query(format!(
                "`{}` is not of the form data.<package>.<rule>",
                query
            ))),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data.{}.{}", self.package, self.rule)
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Evaluates rules of one policy against one input, memoising rule values
pub(crate) struct Evaluator<'a> {
    policy: &'a CompiledPolicy,
    input: &'a Map<String, Value>,
    memo: HashMap<String, Option<Value>>,
    deny_reasons: Option<Value>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(policy: &'a CompiledPolicy, input: &'a Map<String, Value>) -> Self {
        Self {
            policy,
            input,
            memo: HashMap::new(),
            deny_reasons: None,
        }
    }

    /// Value of a rule; the compiler guarantees references are acyclic
    pub(crate) fn rule(&mut self, name: &str) -> PolicyResult<Option<Value>> {
        if let Some(cached) = self.memo.get(name) {
            return Ok(cached.clone());
        }

        let policy = self.policy;
        let def = policy
            .rule(name)
            .ok_or_else(|| PolicyError::Eval(format!("unknown rule `{}`", name)))?;

        let mut value = None;
        if let Some(body) = &def.body {
            let holds = match &body.condition {
                Some(condition) => self.holds(condition)?,
                None => true,
            };
            if holds {
                value = self.expr(&body.value)?;
            }
        }
        if value.is_none() {
            if let Some(default) = &def.default {
                value = self.expr(default)?;
            }
        }

        self.memo.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Reasons of every deny rule whose condition holds, in source order
    pub(crate) fn deny_reasons(&mut self) -> PolicyResult<Value> {
        if let Some(cached) = &self.deny_reasons {
            return Ok(cached.clone());
        }

        let policy = self.policy;
        let mut reasons = Vec::new();
        for deny in policy.denies() {
            if self.holds(&deny.condition)? {
                reasons.push(Value::String(deny.reason.clone()));
            }
        }

        let value = Value::Array(reasons);
        self.deny_reasons = Some(value.clone());
        Ok(value)
    }

    fn holds(&mut self, condition: &Expr) -> PolicyResult<bool> {
        match self.expr(condition)? {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(PolicyError::Eval(format!(
                "condition must be boolean, got {}",
                type_name(&other)
            ))),
        }
    }

    fn truthy(&mut self, expr: &Expr, op: &str) -> PolicyResult<bool> {
        match self.expr(expr)? {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(PolicyError::Eval(format!(
                "operand of `{}` must be boolean, got {}",
                op,
                type_name(&other)
            ))),
        }
    }

    fn expr(&mut self, expr: &Expr) -> PolicyResult<Option<Value>> {
        match expr {
            Expr::Literal(value) => Ok(Some(value.clone())),
            Expr::Input(id) => Ok(self.input.get(id).cloned()),
            Expr::Ref(name) => self.rule(name),
            Expr::DenyReasons => self.deny_reasons().map(Some),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.expr(item)? {
                        Some(value) => values.push(value),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(values)))
            }
            Expr::Object(fields) => {
                let mut object = Map::new();
                for (key, item) in fields {
                    match self.expr(item)? {
                        Some(value) => {
                            object.insert(key.clone(), value);
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Object(object)))
            }
            Expr::Not(inner) => Ok(Some(Value::Bool(!self.truthy(inner, "not")?))),
            Expr::Neg(inner) => match self.expr(inner)? {
                None => Ok(None),
                Some(value) => negate(&value).map(Some),
            },
            Expr::Binary { op: BinOp::And, lhs, rhs } => {
                let result = self.truthy(lhs, "and")? && self.truthy(rhs, "and")?;
                Ok(Some(Value::Bool(result)))
            }
            Expr::Binary { op: BinOp::Or, lhs, rhs } => {
                let result = self.truthy(lhs, "or")? || self.truthy(rhs, "or")?;
                Ok(Some(Value::Bool(result)))
            }
            Expr::Binary { op, lhs, rhs } => {
                let (Some(l), Some(r)) = (self.expr(lhs)?, self.expr(rhs)?) else {
                    return Ok(None);
                };
                binary(*op, &l, &r).map(Some)
            }
        }
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> PolicyResult<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(equal(l, r))),
        BinOp::Ne => Ok(Value::Bool(!equal(l, r))),
        BinOp::Lt => compare(op, l, r).map(|o| Value::Bool(o == Ordering::Less)),
        BinOp::Le => compare(op, l, r).map(|o| Value::Bool(o != Ordering::Greater)),
        BinOp::Gt => compare(op, l, r).map(|o| Value::Bool(o == Ordering::Greater)),
        BinOp::Ge => compare(op, l, r).map(|o| Value::Bool(o != Ordering::Less)),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, l, r),
        BinOp::And | BinOp::Or => Err(PolicyError::Eval(format!(
            "`{}` is not a value operator",
            op.symbol()
        ))),
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`)
fn equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            matches!(compare_numbers(a, b), Some(Ordering::Equal))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|w| equal(v, w)).unwrap_or(false))
        }
        _ => l == r,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> PolicyResult<Ordering> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| type_error(op, l, r))
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> PolicyResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(type_error(op, l, r));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => {
                if y == 0 {
                    return Err(PolicyError::Eval("division by zero".into()));
                }
                match x.checked_rem(y) {
                    Some(0) => x.checked_div(y),
                    Some(_) => return float_result(x as f64 / y as f64),
                    None => None,
                }
            }
            _ => return Err(type_error(op, l, r)),
        };
        return result
            .map(Value::from)
            .ok_or_else(|| PolicyError::Eval(format!("integer overflow in `{}`", op.symbol())));
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(type_error(op, l, r));
    };
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(PolicyError::Eval("division by zero".into()));
            }
            x / y
        }
        _ => return Err(type_error(op, l, r)),
    };
    float_result(result)
}

fn float_result(x: f64) -> PolicyResult<Value> {
    Number::from_f64(x)
        .map(Value::Number)
        .ok_or_else(|| PolicyError::Eval("arithmetic result is not finite".into()))
}

fn negate(value: &Value) -> PolicyResult<Value> {
    let Value::Number(n) = value else {
        return Err(PolicyError::Eval(format!(
            "cannot negate {}",
            type_name(value)
        )));
    };
    if let Some(i) = n.as_i64() {
        return i
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| PolicyError::Eval("integer overflow in `-`".into()));
    }
    match n.as_f64() {
        Some(f) => float_result(-f),
        None => Err(PolicyError::Eval("cannot negate unsigned number".into())),
    }
}

fn type_error(op: BinOp, l: &Value, r: &Value) -> PolicyError {
    PolicyError::Eval(format!(
        "cannot apply `{}` to {} and {}",
        op.symbol(),
        type_name(l),
        type_name(r)
    ))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
