//! Regex match dispatch for the `=~` operator
//!
//! Patterns compile case-insensitively; compiled patterns are cached on the
//! scope tree. A pattern applied to an array matches when any element does.

use super::RegexProtocol;
use crate::context::EvalContext;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RegexDispatcher {
    impls: Vec<Arc<dyn RegexProtocol>>,
}

impl RegexDispatcher {
    pub fn add_impl(&mut self, imp: Arc<dyn RegexProtocol>) {
        self.impls.push(imp);
    }

    pub fn matches(
        &self,
        ctx: &EvalContext,
        scope: &Scope,
        pattern: &Value,
        target: &Value,
    ) -> bool {
        match (pattern, target) {
            (Value::Lazy(l), _) => scope.matches(ctx, &l.reduce(ctx), target),
            (_, Value::Lazy(l)) => scope.matches(ctx, pattern, &l.reduce(ctx)),

            (Value::String(pat), Value::String(s)) => scope
                .compile_regex(pat, true)
                .map(|re| re.is_match(s))
                .unwrap_or(false),

            (Value::String(_), Value::Array(items)) => {
                items.iter().any(|item| scope.matches(ctx, pattern, item))
            }

            _ => {
                for imp in &self.impls {
                    if imp.applicable(pattern, target) {
                        return imp.matches(ctx, scope, pattern, target);
                    }
                }
                false
            }
        }
    }
}
