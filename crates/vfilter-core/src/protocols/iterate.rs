//! Iteration dispatch
//!
//! Turns any value into a row stream. Null iterates to nothing; a scalar
//! wraps itself as a single `{_value: ...}` row; a sequence emits one row per
//! element, wrapping non-dict elements the same way.

use super::IterateProtocol;
use crate::context::EvalContext;
use crate::dict::Dict;
use crate::scope::Scope;
use crate::stream::RowStream;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct IterateDispatcher {
    impls: Vec<Arc<dyn IterateProtocol>>,
}

impl IterateDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn IterateProtocol>) {
        self.impls.push(imp);
    }

    pub fn iterate(&self, ctx: &EvalContext, scope: &Scope, a: &Value) -> RowStream {
        match a {
            Value::Null => RowStream::empty(),
            Value::Lazy(l) => scope.iterate(ctx, &l.reduce(ctx)),
            Value::Query(q) => q.eval(ctx),
            Value::Dict(d) => RowStream::single(d.clone()),
            Value::Array(items) => {
                let rows: Vec<Dict> = items
                    .iter()
                    .map(|item| match item {
                        Value::Dict(d) => d.clone(),
                        other => Dict::new().with("_value", other.clone()),
                    })
                    .collect();
                RowStream::from_rows(ctx, scope.options().channel_capacity, rows)
            }
            other => {
                for imp in &self.impls {
                    if imp.applicable(other) {
                        return imp.iterate(ctx, scope, other);
                    }
                }
                scope.trace(&format!("no Iterate protocol for {}", other.type_name()));
                RowStream::single(Dict::new().with("_value", other.clone()))
            }
        }
    }
}
