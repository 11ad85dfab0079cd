//! VFilter - an embeddable streaming query language (VQL)
//!
//! This is the main library crate that re-exports the VFilter components.
//!
//! A host embeds the runtime by building a scope, registering its plugins
//! and functions, then parsing and evaluating query text:
//!
//! ```
//! use vfilter::{new_scope, parse, eval_to_rows, ArgMap, EvalContext, Dict, GenericListPlugin};
//!
//! let scope = new_scope();
//! scope.append_plugin(GenericListPlugin::new("range", |ctx, scope, args| {
//!     let map = ArgMap::new(ctx, scope, args);
//!     let (Some(start), Some(end)) = (map.required_int("start"), map.required_int("end"))
//!     else {
//!         return Vec::new();
//!     };
//!     (start..=end).map(|i| Dict::new().with("value", i)).collect()
//! }));
//!
//! let ctx = EvalContext::new();
//! let vql = parse("SELECT * FROM range(start=1, end=4)").unwrap();
//! let rows = eval_to_rows(&ctx, &scope, &vql);
//! assert_eq!(rows.len(), 4);
//! ```

pub use vfilter_core as core;
pub use vfilter_query as query;

// Re-export commonly used types
pub use vfilter_core::{
    AggContext, ArgDesc, Dict, Error, EvalContext, FunctionInfo, GenericListPlugin, HostObject,
    LazyExpr, LazyValue, OpaqueValue, Plugin, PluginInfo, ProtocolImpl, Result, RowSender,
    RowStream, Scope, ScopeOptions, StoredQuery, StoredQueryValue, Value, VqlFunction,
};

pub use vfilter_query::{
    eval_expr, eval_let, eval_select, eval_to_rows, new_scope, new_scope_with_options, parse,
    parse_multi, ArgMap, FromArgs, Select, VQL,
};
