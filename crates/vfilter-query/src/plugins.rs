//! Built-in plugins

use crate::args::ArgMap;
use std::sync::Arc;
use vfilter_core::{
    ArgDesc, Dict, EvalContext, Plugin, PluginInfo, RowStream, Scope, Value,
};

/// `scope()`: a single row holding every visible variable, newest binding
/// winning. Useful as a one-row source for pure expressions.
pub struct ScopePlugin;

impl Plugin for ScopePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "scope".to_string(),
            doc: "Emit the current scope as a single row.".to_string(),
            args: Vec::new(),
        }
    }

    fn call(&self, _ctx: &EvalContext, scope: &Scope, _args: Dict) -> RowStream {
        let mut row = Dict::new();
        for frame in scope.frames() {
            for (k, v) in frame.iter() {
                row.set(k.clone(), v.clone());
            }
        }
        RowStream::single(row)
    }
}

/// `if(condition=..., then={...}, else={...})`: stream the selected branch.
pub struct IfPlugin;

impl Plugin for IfPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "if".to_string(),
            doc: "Stream one of two row sources depending on a condition.".to_string(),
            args: vec![
                ArgDesc::required("condition"),
                ArgDesc::required("then"),
                ArgDesc::optional("else"),
            ],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream {
        let map = ArgMap::new(ctx, scope, &args);
        let Some(condition) = map.reduced("condition") else {
            scope.trace("if: condition is required");
            return RowStream::empty();
        };
        let branch = if scope.as_bool(ctx, &condition) {
            map.raw("then")
        } else {
            map.raw("else")
        };
        match branch {
            Some(v) => scope.iterate(ctx, &v),
            None => RowStream::empty(),
        }
    }
}

/// `chain(a={...}, b={...}, ...)`: concatenate each argument's rows in
/// argument order.
pub struct ChainPlugin;

impl Plugin for ChainPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "chain".to_string(),
            doc: "Concatenate row sources in argument order.".to_string(),
            args: Vec::new(),
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream {
        let scope = scope.clone();
        let ctx_inner = ctx.clone();
        let capacity = scope.options().channel_capacity;
        RowStream::spawn(ctx, capacity, move |sender| {
            for (_, value) in args.iter() {
                if ctx_inner.is_cancelled() {
                    return;
                }
                for row in scope.iterate(&ctx_inner, value) {
                    if !sender.send(row) {
                        return;
                    }
                }
            }
        })
    }
}

/// `foreach(row={...}, query={...})`: for each row of the outer source, push
/// it as a variable frame and stream the inner query under it.
pub struct ForeachPlugin;

impl Plugin for ForeachPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "foreach".to_string(),
            doc: "Run a query once per row of another query.".to_string(),
            args: vec![ArgDesc::required("row"), ArgDesc::required("query")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream {
        let scope = scope.clone();
        let ctx_inner = ctx.clone();
        let capacity = scope.options().channel_capacity;
        RowStream::spawn(ctx, capacity, move |sender| {
            let Some(row_source) = args.get("row").cloned() else {
                scope.trace("foreach: row is required");
                return;
            };
            let Some(query) = args.get("query").cloned() else {
                scope.trace("foreach: query is required");
                return;
            };

            for row in scope.iterate(&ctx_inner, &row_source) {
                if ctx_inner.is_cancelled() {
                    return;
                }
                let child = scope.copy();
                child.append_vars(row);
                let inner = match &query {
                    // Re-bind the stored query against the per-row scope.
                    Value::Query(q) => q.eval_with(&ctx_inner, &child),
                    other => child.iterate(&ctx_inner, other),
                };
                for out_row in inner {
                    if !sender.send(out_row) {
                        return;
                    }
                }
            }
        })
    }
}

/// `flatten(query={...})`: emit the cross-product of every sequence-valued
/// column. Empty sequences flatten to Null.
pub struct FlattenPlugin;

impl Plugin for FlattenPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "flatten".to_string(),
            doc: "Expand sequence-valued columns into one row per combination.".to_string(),
            args: vec![ArgDesc::required("query")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream {
        let scope = scope.clone();
        let ctx_inner = ctx.clone();
        let capacity = scope.options().channel_capacity;
        RowStream::spawn(ctx, capacity, move |sender| {
            let Some(query) = args.get("query").cloned() else {
                scope.trace("flatten: query is required");
                return;
            };
            for row in scope.iterate(&ctx_inner, &query) {
                if ctx_inner.is_cancelled() {
                    return;
                }
                let materialized = match scope.materialize(&ctx_inner, &Value::Dict(row)) {
                    Value::Dict(d) => d,
                    _ => continue,
                };
                for flat in flatten_row(&materialized) {
                    if !sender.send(flat) {
                        return;
                    }
                }
            }
        })
    }
}

fn flatten_row(row: &Dict) -> Vec<Dict> {
    let mut results = vec![Dict::new()];
    for (key, value) in row.iter() {
        match value {
            Value::Array(items) if !items.is_empty() => {
                let mut expanded = Vec::with_capacity(results.len() * items.len());
                for base in &results {
                    for item in items {
                        let mut next = base.clone();
                        next.set(key.clone(), item.clone());
                        expanded.push(next);
                    }
                }
                results = expanded;
            }
            Value::Array(_) => {
                for base in &mut results {
                    base.set(key.clone(), Value::Null);
                }
            }
            other => {
                for base in &mut results {
                    base.set(key.clone(), other.clone());
                }
            }
        }
    }
    results
}

pub fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(ScopePlugin),
        Arc::new(IfPlugin),
        Arc::new(ChainPlugin),
        Arc::new(ForeachPlugin),
        Arc::new(FlattenPlugin),
    ]
}
