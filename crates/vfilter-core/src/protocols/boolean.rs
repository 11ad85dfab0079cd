//! Truth-value dispatch

use super::BoolProtocol;
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct BoolDispatcher {
    impls: Vec<Arc<dyn BoolProtocol>>,
}

impl BoolDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn BoolProtocol>) {
        self.impls.push(imp);
    }

    pub fn as_bool(&self, ctx: &EvalContext, scope: &Scope, a: &Value) -> bool {
        match a {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(v) => !v.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Lazy(l) => scope.as_bool(ctx, &l.reduce(ctx)),
            Value::Query(q) => {
                // True when the query produces at least one row. Probe with a
                // child context so the source shuts down after the first row.
                let probe = ctx.child();
                let mut stream = q.eval(&probe);
                let has_rows = stream.next().is_some();
                probe.cancel();
                has_rows
            }
            Value::Opaque(_) => {
                for imp in &self.impls {
                    if imp.applicable(a) {
                        return imp.as_bool(ctx, scope, a);
                    }
                }
                scope.trace(&format!("no Bool protocol for {}", a.type_name()));
                false
            }
        }
    }
}
