//! The scope: variables, registries, and dispatchers
//!
//! A scope is the ambient environment consulted by every reduction. It holds
//! a stack of variable frames (newest shadows oldest), shares the function
//! and plugin registries with its whole tree, and owns an independent copy of
//! each protocol dispatcher so child extensions never leak upward.
//!
//! Cloning a [`Scope`] clones the handle, not the scope; [`Scope::copy`]
//! creates a child.

use crate::context::EvalContext;
use crate::dict::Dict;
use crate::options::ScopeOptions;
use crate::plugin::{Plugin, VqlFunction};
use crate::protocols::{Dispatchers, ProtocolImpl};
use crate::stream::RowStream;
use crate::value::Value;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Per-group (or per-query) accumulator state for aggregate functions,
/// keyed by call-site identity.
#[derive(Default)]
pub struct AggContext {
    state: Mutex<HashMap<String, Value>>,
}

impl AggContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.state.lock().insert(key.to_string(), value);
    }

    /// Read-modify-write under the lock; returns the stored result.
    pub fn update<F: FnOnce(Option<Value>) -> Value>(&self, key: &str, f: F) -> Value {
        let mut state = self.state.lock();
        let current = state.get(key).cloned();
        let next = f(current);
        state.insert(key.to_string(), next.clone());
        next
    }
}

// State shared by every scope in one tree.
struct SharedState {
    functions: Mutex<HashMap<String, Arc<dyn VqlFunction>>>,
    plugins: Mutex<HashMap<String, Arc<dyn Plugin>>>,
    options: ScopeOptions,
    regex_cache: Mutex<HashMap<String, Option<Regex>>>,
    reduction_depth: AtomicUsize,
}

struct ScopeState {
    vars: Vec<Arc<Dict>>,
    dispatchers: Dispatchers,
    agg: Option<Arc<AggContext>>,
    call_sites: Vec<String>,
    children: Vec<Scope>,
    destructors: Vec<Box<dyn FnOnce() + Send>>,
    destroyed: bool,
}

struct ScopeInner {
    shared: Arc<SharedState>,
    state: Mutex<ScopeState>,
}

/// Handle to one scope in a scope tree.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

/// RAII token for one level of recursive reduction. Dropping it releases
/// the level.
pub struct DepthGuard {
    shared: Arc<SharedState>,
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.shared.reduction_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Scope {
    /// A bare root scope with default options and a `NULL` binding. Built-in
    /// protocol fast paths live in the dispatchers themselves, so a bare
    /// scope already evaluates the core language.
    pub fn new() -> Self {
        Self::with_options(ScopeOptions::default())
    }

    pub fn with_options(options: ScopeOptions) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                shared: Arc::new(SharedState {
                    functions: Mutex::new(HashMap::new()),
                    plugins: Mutex::new(HashMap::new()),
                    options,
                    regex_cache: Mutex::new(HashMap::new()),
                    reduction_depth: AtomicUsize::new(0),
                }),
                state: Mutex::new(ScopeState {
                    vars: vec![Arc::new(Dict::new().with("NULL", Value::Null))],
                    dispatchers: Dispatchers::default(),
                    agg: None,
                    call_sites: Vec::new(),
                    children: Vec::new(),
                    destructors: Vec::new(),
                    destroyed: false,
                }),
            }),
        }
    }

    pub fn options(&self) -> ScopeOptions {
        self.inner.shared.options.clone()
    }

    /// Push a variable frame. Later frames shadow earlier ones.
    pub fn append_vars(&self, frame: Dict) -> &Self {
        self.inner.state.lock().vars.push(Arc::new(frame));
        self
    }

    /// Walk frames newest-first; the first present binding wins.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        let frames = self.inner.state.lock().vars.clone();
        for frame in frames.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    /// Union of all visible variable names, oldest frame first.
    pub fn keys(&self) -> Vec<String> {
        let frames = self.inner.state.lock().vars.clone();
        let mut seen = Vec::new();
        for frame in frames.iter() {
            for k in frame.keys() {
                if !seen.contains(k) {
                    seen.push(k.clone());
                }
            }
        }
        seen
    }

    /// The variable frames themselves, oldest first. Newest-first shadowing
    /// means later frames win when the caller flattens them.
    pub fn frames(&self) -> Vec<Arc<Dict>> {
        self.inner.state.lock().vars.clone()
    }

    pub fn append_function<F: VqlFunction + 'static>(&self, function: F) -> &Self {
        let f: Arc<dyn VqlFunction> = Arc::new(function);
        self.append_functions([f])
    }

    /// Register functions by `info().name`; later registrations overwrite
    /// earlier ones with the same name.
    pub fn append_functions<I>(&self, functions: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn VqlFunction>>,
    {
        let mut registry = self.inner.shared.functions.lock();
        for f in functions {
            registry.insert(f.info().name, f);
        }
        drop(registry);
        self
    }

    pub fn append_plugin<P: Plugin + 'static>(&self, plugin: P) -> &Self {
        let p: Arc<dyn Plugin> = Arc::new(plugin);
        self.append_plugins([p])
    }

    pub fn append_plugins<I>(&self, plugins: I) -> &Self
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        let mut registry = self.inner.shared.plugins.lock();
        for p in plugins {
            registry.insert(p.info().name, p);
        }
        drop(registry);
        self
    }

    pub fn get_function(&self, name: &str) -> Option<Arc<dyn VqlFunction>> {
        self.inner.shared.functions.lock().get(name).cloned()
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner.shared.plugins.lock().get(name).cloned()
    }

    pub fn add_protocol_impl(&self, imp: ProtocolImpl) -> &Self {
        self.inner.state.lock().dispatchers.add_impl(imp);
        self
    }

    pub fn add_protocol_impls<I>(&self, impls: I) -> &Self
    where
        I: IntoIterator<Item = ProtocolImpl>,
    {
        let mut state = self.inner.state.lock();
        for imp in impls {
            state.dispatchers.add_impl(imp);
        }
        drop(state);
        self
    }

    /// A sibling scope sharing registries, with a fresh variable stack
    /// containing only the `NULL` binding. Dispatchers are copied from this
    /// scope. The sibling is not part of this scope's close chain.
    pub fn new_scope(&self) -> Scope {
        let dispatchers = self.inner.state.lock().dispatchers.clone();
        Scope {
            inner: Arc::new(ScopeInner {
                shared: self.inner.shared.clone(),
                state: Mutex::new(ScopeState {
                    vars: vec![Arc::new(Dict::new().with("NULL", Value::Null))],
                    dispatchers,
                    agg: None,
                    call_sites: Vec::new(),
                    children: Vec::new(),
                    destructors: Vec::new(),
                    destroyed: false,
                }),
            }),
        }
    }

    /// A child scope: shared registries, the variable stack shallow-copied,
    /// and each dispatcher copied. Closed when this scope closes.
    pub fn copy(&self) -> Scope {
        let child = {
            let state = self.inner.state.lock();
            Scope {
                inner: Arc::new(ScopeInner {
                    shared: self.inner.shared.clone(),
                    state: Mutex::new(ScopeState {
                        vars: state.vars.clone(),
                        dispatchers: state.dispatchers.clone(),
                        agg: state.agg.clone(),
                        call_sites: Vec::new(),
                        children: Vec::new(),
                        destructors: Vec::new(),
                        destroyed: false,
                    }),
                }),
            }
        };
        self.inner.state.lock().children.push(child.clone());
        child
    }

    pub fn set_agg_context(&self, agg: Arc<AggContext>) {
        self.inner.state.lock().agg = Some(agg);
    }

    pub fn agg_context(&self) -> Option<Arc<AggContext>> {
        self.inner.state.lock().agg.clone()
    }

    /// The evaluator publishes the rendered call text before dispatching an
    /// aggregate function; the function keys its accumulator state on it.
    pub fn push_call_site(&self, site: String) {
        self.inner.state.lock().call_sites.push(site);
    }

    pub fn pop_call_site(&self) {
        self.inner.state.lock().call_sites.pop();
    }

    pub fn current_call_site(&self) -> Option<String> {
        self.inner.state.lock().call_sites.last().cloned()
    }

    /// Enqueue a destructor for LIFO execution at close. If the scope is
    /// already closed the destructor runs immediately on this thread.
    pub fn add_destructor<F: FnOnce() + Send + 'static>(&self, f: F) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            drop(state);
            f();
        } else {
            state.destructors.push(Box::new(f));
        }
    }

    /// Mark destroyed, run destructors in reverse registration order (each
    /// bounded by a soft timeout; a stuck destructor keeps running but stops
    /// being waited on), then close all children.
    pub fn close(&self) {
        let (destructors, children) = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (
                std::mem::take(&mut state.destructors),
                state.children.clone(),
            )
        };

        let timeout = self.inner.shared.options.destructor_timeout();
        for destructor in destructors.into_iter().rev() {
            let (tx, rx) = crossbeam_channel::bounded::<()>(1);
            let spawned = thread::Builder::new()
                .name("vql-destructor".to_string())
                .spawn(move || {
                    destructor();
                    let _ = tx.send(());
                });
            match spawned {
                Ok(_) => {
                    if rx.recv_timeout(timeout).is_err() {
                        tracing::warn!(target: "vql", "destructor exceeded its deadline; continuing close");
                    }
                }
                Err(_) => tracing::warn!(target: "vql", "failed to spawn destructor thread"),
            }
        }

        for child in children {
            child.close();
        }
    }

    pub fn log(&self, message: &str) {
        tracing::info!(target: "vql", "{message}");
    }

    pub fn trace(&self, message: &str) {
        tracing::trace!(target: "vql", "{message}");
    }

    /// Claim one level of recursive reduction. Returns None past the
    /// configured ceiling; the caller yields Null.
    pub fn enter_reduction(&self) -> Option<DepthGuard> {
        let shared = &self.inner.shared;
        let depth = shared.reduction_depth.fetch_add(1, Ordering::SeqCst);
        if depth >= shared.options.max_stack_depth {
            shared.reduction_depth.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(DepthGuard {
            shared: shared.clone(),
        })
    }

    /// Compile a pattern through the tree-wide cache. Failed compilations
    /// are cached too so a bad pattern only traces once.
    pub fn compile_regex(&self, pattern: &str, case_insensitive: bool) -> Option<Regex> {
        let key = if case_insensitive {
            format!("i\u{1}{pattern}")
        } else {
            format!("s\u{1}{pattern}")
        };
        let mut cache = self.inner.shared.regex_cache.lock();
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
        let source = if case_insensitive {
            format!("(?i){pattern}")
        } else {
            pattern.to_string()
        };
        let compiled = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(err) => {
                self.trace(&format!("invalid regex {pattern:?}: {err}"));
                None
            }
        };
        cache.insert(key, compiled.clone());
        compiled
    }

    // --- Protocol entry points -------------------------------------------
    //
    // Each clones the relevant dispatcher out of the lock so implementations
    // are free to call back into the scope.

    pub fn as_bool(&self, ctx: &EvalContext, a: &Value) -> bool {
        let d = self.inner.state.lock().dispatchers.boolean.clone();
        d.as_bool(ctx, self, a)
    }

    pub fn eq(&self, ctx: &EvalContext, a: &Value, b: &Value) -> bool {
        let d = self.inner.state.lock().dispatchers.eq.clone();
        d.eq(ctx, self, a, b)
    }

    pub fn lt(&self, ctx: &EvalContext, a: &Value, b: &Value) -> bool {
        let d = self.inner.state.lock().dispatchers.lt.clone();
        d.lt(ctx, self, a, b)
    }

    pub fn add(&self, ctx: &EvalContext, a: &Value, b: &Value) -> Value {
        let d = self.inner.state.lock().dispatchers.add.clone();
        d.add(ctx, self, a, b)
    }

    pub fn sub(&self, ctx: &EvalContext, a: &Value, b: &Value) -> Value {
        let d = self.inner.state.lock().dispatchers.sub.clone();
        d.sub(ctx, self, a, b)
    }

    pub fn mul(&self, ctx: &EvalContext, a: &Value, b: &Value) -> Value {
        let d = self.inner.state.lock().dispatchers.mul.clone();
        d.mul(ctx, self, a, b)
    }

    pub fn div(&self, ctx: &EvalContext, a: &Value, b: &Value) -> Value {
        let d = self.inner.state.lock().dispatchers.div.clone();
        d.div(ctx, self, a, b)
    }

    /// Is `a` a member of `b`?
    pub fn membership(&self, ctx: &EvalContext, a: &Value, b: &Value) -> bool {
        let d = self.inner.state.lock().dispatchers.membership.clone();
        d.contains(ctx, self, a, b)
    }

    /// Resolve `a.b` / `a[b]`. None means the member is absent.
    pub fn associative(&self, ctx: &EvalContext, a: &Value, b: &Value) -> Option<Value> {
        let d = self.inner.state.lock().dispatchers.associative.clone();
        d.associative(ctx, self, a, b)
    }

    pub fn get_members(&self, a: &Value) -> Vec<String> {
        let d = self.inner.state.lock().dispatchers.associative.clone();
        d.get_members(self, a)
    }

    /// Does `pattern` match `target`?
    pub fn matches(&self, ctx: &EvalContext, pattern: &Value, target: &Value) -> bool {
        let d = self.inner.state.lock().dispatchers.regex.clone();
        d.matches(ctx, self, pattern, target)
    }

    pub fn iterate(&self, ctx: &EvalContext, a: &Value) -> RowStream {
        let d = self.inner.state.lock().dispatchers.iterate.clone();
        d.iterate(ctx, self, a)
    }

    /// Deep-reduce a value: lazy expressions reduce, stored queries drain
    /// exactly once into a sequence, containers recurse.
    pub fn materialize(&self, ctx: &EvalContext, v: &Value) -> Value {
        match v {
            Value::Lazy(l) => self.materialize(ctx, &l.reduce(ctx)),
            Value::Query(q) => Value::Array(
                q.eval(ctx)
                    .map(|row| self.materialize(ctx, &Value::Dict(row)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|i| self.materialize(ctx, i)).collect())
            }
            Value::Dict(d) => Value::Dict(
                d.iter()
                    .map(|(k, val)| (k.clone(), self.materialize(ctx, val)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scope")
            .field("frames", &state.vars.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
