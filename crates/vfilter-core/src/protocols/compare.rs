//! Equality and ordering dispatch

use super::{numeric_or_bool, EqProtocol, LtProtocol};
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct EqDispatcher {
    impls: Vec<Arc<dyn EqProtocol>>,
}

impl EqDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn EqProtocol>) {
        self.impls.push(imp);
    }

    pub fn eq(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Lazy(l), _) => scope.eq(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.eq(ctx, a, &l.reduce(ctx)),

            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,

            (Value::String(x), Value::String(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Int(x), Value::Float(y)) => (*x as f64) == *y,
            (Value::Float(x), Value::Int(y)) => *x == (*y as f64),
            (Value::Float(x), Value::Float(y)) => x == y,

            (Value::Bool(x), Value::Bool(y)) => x == y,
            // A bool compared against anything else compares truth values:
            // 1 = TRUE, 0 = FALSE.
            (Value::Bool(x), other) | (other, Value::Bool(x)) => {
                scope.as_bool(ctx, other) == *x
            }

            (Value::Array(x), Value::Array(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(xv, yv)| scope.eq(ctx, xv, yv))
            }
            (Value::Dict(x), Value::Dict(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(k, xv)| y.get(k).is_some_and(|yv| scope.eq(ctx, xv, yv)))
            }

            (Value::Query(_), _) | (_, Value::Query(_)) => {
                let ma = scope.materialize(ctx, a);
                let mb = scope.materialize(ctx, b);
                scope.eq(ctx, &ma, &mb)
            }

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.eq(ctx, scope, a, b);
                    }
                }
                false
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LtDispatcher {
    impls: Vec<Arc<dyn LtProtocol>>,
}

impl LtDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn LtProtocol>) {
        self.impls.push(imp);
    }

    /// Non-comparable pairs answer false both ways, which a stable sort
    /// treats as equal.
    pub fn lt(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Lazy(l), _) => scope.lt(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.lt(ctx, a, &l.reduce(ctx)),

            (Value::Int(x), Value::Int(y)) => x < y,
            (Value::String(x), Value::String(y)) => x < y,

            _ => {
                if let (Some(x), Some(y)) = (numeric_or_bool(a), numeric_or_bool(b)) {
                    return x < y;
                }
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.lt(ctx, scope, a, b);
                    }
                }
                false
            }
        }
    }
}
