//! Arithmetic dispatch
//!
//! Faults never abort: overflow, incompatible operand types, and division by
//! zero all yield Null, and Null itself is absorbing.

use super::{AddProtocol, DivProtocol, MulProtocol, SubProtocol};
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AddDispatcher {
    impls: Vec<Arc<dyn AddProtocol>>,
}

impl AddDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn AddProtocol>) {
        self.impls.push(imp);
    }

    pub fn add(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value {
        match (a, b) {
            (Value::Lazy(l), _) => scope.add(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.add(ctx, a, &l.reduce(ctx)),

            (Value::Null, _) | (_, Value::Null) => Value::Null,

            (Value::Int(x), Value::Int(y)) => x.checked_add(*y).map(Value::Int).unwrap_or(Value::Null),
            (Value::Int(x), Value::Float(y)) => Value::Float(*x as f64 + y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x + *y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x + y),

            (Value::String(x), Value::String(y)) => {
                let mut out = x.clone();
                out.push_str(y);
                Value::String(out)
            }

            (Value::Query(_), _) | (_, Value::Query(_)) => {
                let ma = scope.materialize(ctx, a);
                let mb = scope.materialize(ctx, b);
                scope.add(ctx, &ma, &mb)
            }

            // Adding sequences makes one longer sequence; adding a scalar to
            // a sequence appends it.
            (Value::Array(x), Value::Array(y)) => {
                let mut out = x.clone();
                out.extend(y.iter().cloned());
                Value::Array(out)
            }
            (Value::Array(x), other) => {
                let mut out = x.clone();
                out.push(other.clone());
                Value::Array(out)
            }

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.add(ctx, scope, a, b);
                    }
                }
                scope.trace(&format!(
                    "cannot add {} and {}",
                    a.type_name(),
                    b.type_name()
                ));
                Value::Null
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct SubDispatcher {
    impls: Vec<Arc<dyn SubProtocol>>,
}

impl SubDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn SubProtocol>) {
        self.impls.push(imp);
    }

    pub fn sub(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value {
        match (a, b) {
            (Value::Lazy(l), _) => scope.sub(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.sub(ctx, a, &l.reduce(ctx)),

            (Value::Null, _) | (_, Value::Null) => Value::Null,

            (Value::Int(x), Value::Int(y)) => x.checked_sub(*y).map(Value::Int).unwrap_or(Value::Null),
            (Value::Int(x), Value::Float(y)) => Value::Float(*x as f64 - y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x - *y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x - y),

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.sub(ctx, scope, a, b);
                    }
                }
                Value::Null
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MulDispatcher {
    impls: Vec<Arc<dyn MulProtocol>>,
}

impl MulDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn MulProtocol>) {
        self.impls.push(imp);
    }

    pub fn mul(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value {
        match (a, b) {
            (Value::Lazy(l), _) => scope.mul(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.mul(ctx, a, &l.reduce(ctx)),

            (Value::Null, _) | (_, Value::Null) => Value::Null,

            (Value::Int(x), Value::Int(y)) => x.checked_mul(*y).map(Value::Int).unwrap_or(Value::Null),
            (Value::Int(x), Value::Float(y)) => Value::Float(*x as f64 * y),
            (Value::Float(x), Value::Int(y)) => Value::Float(x * *y as f64),
            (Value::Float(x), Value::Float(y)) => Value::Float(x * y),

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.mul(ctx, scope, a, b);
                    }
                }
                Value::Null
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct DivDispatcher {
    impls: Vec<Arc<dyn DivProtocol>>,
}

impl DivDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn DivProtocol>) {
        self.impls.push(imp);
    }

    pub fn div(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value {
        match (a, b) {
            (Value::Lazy(l), _) => scope.div(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.div(ctx, a, &l.reduce(ctx)),

            (Value::Null, _) | (_, Value::Null) => Value::Null,

            _ => {
                if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                    if y == 0.0 {
                        scope.trace("division by zero");
                        return Value::Null;
                    }
                    return Value::Float(x / y);
                }
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.div(ctx, scope, a, b);
                    }
                }
                Value::Null
            }
        }
    }
}
