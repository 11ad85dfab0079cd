//! Field access and indexing dispatch
//!
//! Resolves `a.b` and `a[b]`. Column access on a sequence of rows maps the
//! access over every element, which is how `subquery.column` produces the
//! column as an array.

use super::AssociativeProtocol;
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AssociativeDispatcher {
    impls: Vec<Arc<dyn AssociativeProtocol>>,
}

impl AssociativeDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn AssociativeProtocol>) {
        self.impls.push(imp);
    }

    pub fn associative(
        &self,
        ctx: &EvalContext,
        scope: &Scope,
        a: &Value,
        b: &Value,
    ) -> Option<Value> {
        match (a, b) {
            (Value::Lazy(l), _) => scope.associative(ctx, &l.reduce(ctx), b),

            (Value::Dict(d), Value::String(field)) => d.get(field).cloned(),

            (Value::Array(items), Value::Int(index)) => {
                usize::try_from(*index).ok().and_then(|i| items.get(i).cloned())
            }

            // Column access over a sequence of rows: collect the field from
            // every element that has it.
            (Value::Array(items), Value::String(_)) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| scope.associative(ctx, item, b))
                    .collect(),
            )),

            (Value::Query(_), _) => {
                let ma = scope.materialize(ctx, a);
                scope.associative(ctx, &ma, b)
            }

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.associative(ctx, scope, a, b);
                    }
                }
                None
            }
        }
    }

    /// Enumerate the member names of `a`, for `*` expansion.
    pub fn get_members(&self, scope: &Scope, a: &Value) -> Vec<String> {
        match a {
            Value::Dict(d) => d.keys().cloned().collect(),
            _ => {
                for imp in &self.impls {
                    if imp.members_applicable(a) {
                        return imp.get_members(scope, a);
                    }
                }
                Vec::new()
            }
        }
    }
}
