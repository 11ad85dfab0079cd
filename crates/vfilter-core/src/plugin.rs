//! Host extension points
//!
//! Hosts specialize the language by registering plugins (row sources) and
//! functions (scalar operators) on a scope. Arguments arrive as a [`Dict`]
//! of unreduced values; implementations reduce what they need.

use crate::context::EvalContext;
use crate::dict::Dict;
use crate::scope::Scope;
use crate::stream::RowStream;
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

/// Describes one declared argument of a plugin or function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgDesc {
    pub name: String,
    pub required: bool,
}

impl ArgDesc {
    pub fn required<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Registration metadata for a plugin.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub doc: String,
    pub args: Vec<ArgDesc>,
}

/// Registration metadata for a function.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub doc: String,
    pub args: Vec<ArgDesc>,
}

/// A row source. `call` runs on the evaluator's thread and should hand the
/// actual row production to [`RowStream::spawn`] so a slow consumer never
/// stalls the caller.
pub trait Plugin: Send + Sync {
    fn info(&self) -> PluginInfo;
    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream;
}

/// A scalar operator.
pub trait VqlFunction: Send + Sync {
    fn info(&self) -> FunctionInfo;
    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value;

    /// Aggregate functions accumulate state in the scope's aggregation
    /// context; the evaluator publishes a call-site key for them before
    /// dispatch.
    fn is_aggregate(&self) -> bool {
        false
    }
}

type ListFn = dyn Fn(&EvalContext, &Scope, &Dict) -> Vec<Dict> + Send + Sync;

/// Convenience plugin wrapping a closure that returns a full row list.
///
/// The closure runs on the producer thread; rows are streamed out through a
/// bounded channel like any other plugin's.
pub struct GenericListPlugin {
    name: String,
    doc: String,
    function: Arc<ListFn>,
}

impl GenericListPlugin {
    pub fn new<S, F>(name: S, function: F) -> Self
    where
        S: Into<String>,
        F: Fn(&EvalContext, &Scope, &Dict) -> Vec<Dict> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: String::new(),
            function: Arc::new(function),
        }
    }

    pub fn with_doc<S: Into<String>>(mut self, doc: S) -> Self {
        self.doc = doc.into();
        self
    }
}

impl Plugin for GenericListPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            doc: self.doc.clone(),
            args: Vec::new(),
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: Dict) -> RowStream {
        let function = self.function.clone();
        let scope = scope.clone();
        let capacity = scope.options().channel_capacity;
        let ctx_clone = ctx.clone();
        RowStream::spawn(ctx, capacity, move |sender| {
            for row in function(&ctx_clone, &scope, &args) {
                if !sender.send(row) {
                    break;
                }
            }
        })
    }
}
