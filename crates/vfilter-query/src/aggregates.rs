//! Aggregate functions
//!
//! `count`, `min`, `max`, and `enumerate` accumulate state in the scope's
//! aggregation context, keyed by call-site identity (the evaluator publishes
//! the rendered call text before dispatching). Inside GROUP BY the context is
//! per group; outside it spans the whole query, so each call reports the
//! running aggregate and the final row carries the total.

use crate::args::ArgMap;
use std::sync::Arc;
use vfilter_core::{ArgDesc, Dict, EvalContext, FunctionInfo, Scope, Value, VqlFunction};

fn call_site_key(scope: &Scope, fallback: &str) -> String {
    scope
        .current_call_site()
        .unwrap_or_else(|| fallback.to_string())
}

pub struct CountFunction;

impl VqlFunction for CountFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "count".to_string(),
            doc: "Counts the rows seen by this call site.".to_string(),
            args: vec![ArgDesc::optional("items")],
        }
    }

    fn is_aggregate(&self) -> bool {
        true
    }

    fn call(&self, _ctx: &EvalContext, scope: &Scope, _args: &Dict) -> Value {
        let Some(agg) = scope.agg_context() else {
            return Value::Int(1);
        };
        let key = call_site_key(scope, "count");
        agg.update(&key, |current| {
            let next = current.and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            Value::Int(next)
        })
    }
}

pub struct MinFunction;

impl VqlFunction for MinFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "min".to_string(),
            doc: "Smallest item seen by this call site.".to_string(),
            args: vec![ArgDesc::required("items")],
        }
    }

    fn is_aggregate(&self) -> bool {
        true
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(item) = map.required_reduced("items") else {
            return Value::Null;
        };
        let Some(agg) = scope.agg_context() else {
            return item;
        };
        let key = call_site_key(scope, "min");
        agg.update(&key, |current| match current {
            None => item.clone(),
            Some(prev) => {
                if scope.lt(ctx, &item, &prev) {
                    item.clone()
                } else {
                    prev
                }
            }
        })
    }
}

pub struct MaxFunction;

impl VqlFunction for MaxFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "max".to_string(),
            doc: "Largest item seen by this call site.".to_string(),
            args: vec![ArgDesc::required("items")],
        }
    }

    fn is_aggregate(&self) -> bool {
        true
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(item) = map.required_reduced("items") else {
            return Value::Null;
        };
        let Some(agg) = scope.agg_context() else {
            return item;
        };
        let key = call_site_key(scope, "max");
        agg.update(&key, |current| match current {
            None => item.clone(),
            Some(prev) => {
                if scope.lt(ctx, &prev, &item) {
                    item.clone()
                } else {
                    prev
                }
            }
        })
    }
}

pub struct EnumerateFunction;

impl VqlFunction for EnumerateFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "enumerate".to_string(),
            doc: "Collects every item seen by this call site into a sequence.".to_string(),
            args: vec![ArgDesc::required("items")],
        }
    }

    fn is_aggregate(&self) -> bool {
        true
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(item) = map.materialized("items") else {
            scope.trace("required argument items is missing");
            return Value::Null;
        };
        let Some(agg) = scope.agg_context() else {
            return Value::Array(vec![item]);
        };
        let key = call_site_key(scope, "enumerate");
        agg.update(&key, |current| {
            let mut list = match current {
                Some(Value::Array(v)) => v,
                _ => Vec::new(),
            };
            list.push(item.clone());
            Value::Array(list)
        })
    }
}

pub fn builtin_aggregates() -> Vec<Arc<dyn VqlFunction>> {
    vec![
        Arc::new(CountFunction),
        Arc::new(MinFunction),
        Arc::new(MaxFunction),
        Arc::new(EnumerateFunction),
    ]
}
