//! Membership dispatch for the `in` operator

use super::MembershipProtocol;
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MembershipDispatcher {
    impls: Vec<Arc<dyn MembershipProtocol>>,
}

impl MembershipDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn MembershipProtocol>) {
        self.impls.push(imp);
    }

    /// Is `a` a member of `b`?
    pub fn contains(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Lazy(l), _) => scope.membership(ctx, &l.reduce(ctx), b),
            (_, Value::Lazy(l)) => scope.membership(ctx, a, &l.reduce(ctx)),

            (_, Value::Array(items)) => items.iter().any(|item| scope.eq(ctx, a, item)),
            (Value::String(needle), Value::String(haystack)) => haystack.contains(needle.as_str()),
            (Value::String(key), Value::Dict(d)) => d.contains_key(key),

            (_, Value::Query(_)) => {
                let mb = scope.materialize(ctx, b);
                scope.membership(ctx, a, &mb)
            }

            _ => {
                for imp in &self.impls {
                    if imp.applicable(a, b) {
                        return imp.contains(ctx, scope, a, b);
                    }
                }
                false
            }
        }
    }
}
