//! The evaluator
//!
//! Drives a SELECT as a lazy pipeline: open the plugin stream, filter each
//! row with WHERE, project columns as unreduced lazy expressions, then apply
//! GROUP BY, ORDER BY, and LIMIT in that order. Reduction of a projected
//! column happens when the consumer reads it, never for rows WHERE filtered
//! out.

use crate::ast::{Arg, BinOp, Columns, Expr, FnCall, Let, LetBody, Literal, OrderBy, Select, VQL};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use vfilter_core::scope::AggContext;
use vfilter_core::{
    Dict, EvalContext, HostObject, LazyExpr, LazyValue, OpaqueValue, RowSender, RowStream, Scope,
    StoredQuery, StoredQueryValue, Value,
};

// A projected column: reduces once per row, memoized so WHERE and the
// consumer observe the same value.
struct LazyExprValue {
    expr: Expr,
    scope: Scope,
    memo: Mutex<Option<Value>>,
}

impl LazyValue for LazyExprValue {
    fn reduce(&self, ctx: &EvalContext) -> Value {
        if let Some(v) = self.memo.lock().clone() {
            return v;
        }
        let v = eval_expr(ctx, &self.scope, &self.expr);
        *self.memo.lock() = Some(v.clone());
        v
    }
}

/// Wrap an expression as a lazy value bound to `scope`.
pub(crate) fn lazy_expr(expr: &Expr, scope: &Scope) -> Value {
    Value::Lazy(LazyExpr::new(Arc::new(LazyExprValue {
        expr: expr.clone(),
        scope: scope.clone(),
        memo: Mutex::new(None),
    })))
}

// A `LET x = expr` binding: re-reduced on every reference, never memoized.
// Only `<=` evaluates once.
struct StoredExpression {
    expr: Expr,
    scope: Scope,
}

impl LazyValue for StoredExpression {
    fn reduce(&self, ctx: &EvalContext) -> Value {
        eval_expr(ctx, &self.scope, &self.expr)
    }
}

struct SelectQuery {
    select: Arc<Select>,
}

impl StoredQuery for SelectQuery {
    fn eval(&self, ctx: &EvalContext, scope: &Scope) -> RowStream {
        eval_select(ctx, scope, self.select.clone())
    }
}

/// Wrap a SELECT as a stored-query value capturing `scope`.
pub(crate) fn stored_query(select: &Select, scope: &Scope) -> Value {
    Value::Query(StoredQueryValue::new(
        Arc::new(SelectQuery {
            select: Arc::new(select.clone()),
        }),
        scope.clone(),
    ))
}

/// A parameterized LET binding. Invocation pushes a frame of its parameters
/// over the captured scope before evaluating the body.
pub(crate) struct LetCallable {
    parameters: Vec<String>,
    body: LetBody,
    scope: Scope,
}

impl HostObject for LetCallable {
    fn type_name(&self) -> &'static str {
        "vql_callable"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl LetCallable {
    fn bind(&self, args: &Dict) -> Scope {
        let scope = self.scope.copy();
        let mut frame = Dict::new();
        for p in &self.parameters {
            frame.set(p.clone(), args.get(p).cloned().unwrap_or(Value::Null));
        }
        scope.append_vars(frame);
        scope
    }

    fn call_value(&self, ctx: &EvalContext, args: &Dict) -> Value {
        let scope = self.bind(args);
        match &self.body {
            LetBody::Expr(e) => eval_expr(ctx, &scope, e),
            LetBody::Query(q) => stored_query(q, &scope),
        }
    }

    fn call_stream(&self, ctx: &EvalContext, args: &Dict) -> RowStream {
        let scope = self.bind(args);
        match &self.body {
            LetBody::Query(q) => eval_select(ctx, &scope, Arc::new((**q).clone())),
            LetBody::Expr(e) => {
                let v = eval_expr(ctx, &scope, e);
                scope.iterate(ctx, &v)
            }
        }
    }
}

/// Peel lazy wrappers off a value.
pub fn reduce(ctx: &EvalContext, v: Value) -> Value {
    match v {
        Value::Lazy(l) => reduce(ctx, l.reduce(ctx)),
        other => other,
    }
}

fn literal_value(l: &Literal) -> Value {
    match l {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Reduce one expression against a scope.
pub fn eval_expr(ctx: &EvalContext, scope: &Scope, expr: &Expr) -> Value {
    let Some(_guard) = scope.enter_reduction() else {
        scope.trace("reduction depth ceiling exceeded");
        return Value::Null;
    };

    match expr {
        Expr::Literal(l) => literal_value(l),
        Expr::Ident(name) => match scope.resolve(name) {
            Some(v) => v,
            None => {
                scope.trace(&format!("symbol {name} not found"));
                Value::Null
            }
        },
        Expr::Array(items) => {
            Value::Array(items.iter().map(|i| eval_expr(ctx, scope, i)).collect())
        }
        Expr::Subquery(sel) => stored_query(sel, scope),
        Expr::Call(call) => eval_call(ctx, scope, call),
        Expr::Not(e) => {
            let v = eval_expr(ctx, scope, e);
            Value::Bool(!scope.as_bool(ctx, &v))
        }
        Expr::Neg(e) => match reduce(ctx, eval_expr(ctx, scope, e)) {
            Value::Int(i) => i.checked_neg().map(Value::Int).unwrap_or(Value::Null),
            Value::Float(f) => Value::Float(-f),
            _ => Value::Null,
        },
        Expr::Binary { op, left, right } => eval_binary(ctx, scope, *op, left, right),
        Expr::Member { base, field } => {
            let b = eval_expr(ctx, scope, base);
            match scope.associative(ctx, &b, &Value::String(field.clone())) {
                Some(v) => v,
                None => {
                    scope.trace(&format!("member {field} not found"));
                    Value::Null
                }
            }
        }
        Expr::Index { base, index } => {
            let b = eval_expr(ctx, scope, base);
            let idx = reduce(ctx, eval_expr(ctx, scope, index));
            scope.associative(ctx, &b, &idx).unwrap_or(Value::Null)
        }
    }
}

fn eval_binary(ctx: &EvalContext, scope: &Scope, op: BinOp, left: &Expr, right: &Expr) -> Value {
    match op {
        // OR and AND short-circuit: the right side is not reduced when the
        // left side already decides.
        BinOp::Or => {
            let l = eval_expr(ctx, scope, left);
            if scope.as_bool(ctx, &l) {
                return Value::Bool(true);
            }
            let r = eval_expr(ctx, scope, right);
            Value::Bool(scope.as_bool(ctx, &r))
        }
        BinOp::And => {
            let l = eval_expr(ctx, scope, left);
            if !scope.as_bool(ctx, &l) {
                return Value::Bool(false);
            }
            let r = eval_expr(ctx, scope, right);
            Value::Bool(scope.as_bool(ctx, &r))
        }
        op => {
            let l = eval_expr(ctx, scope, left);
            let r = eval_expr(ctx, scope, right);
            match op {
                BinOp::Eq => Value::Bool(scope.eq(ctx, &l, &r)),
                BinOp::Ne => Value::Bool(!scope.eq(ctx, &l, &r)),
                BinOp::Lt => Value::Bool(scope.lt(ctx, &l, &r)),
                BinOp::Le => Value::Bool(scope.lt(ctx, &l, &r) || scope.eq(ctx, &l, &r)),
                BinOp::Gt => Value::Bool(scope.lt(ctx, &r, &l)),
                BinOp::Ge => Value::Bool(scope.lt(ctx, &r, &l) || scope.eq(ctx, &l, &r)),
                BinOp::In => Value::Bool(scope.membership(ctx, &l, &r)),
                BinOp::Match => Value::Bool(scope.matches(ctx, &r, &l)),
                BinOp::Add => scope.add(ctx, &l, &r),
                BinOp::Sub => scope.sub(ctx, &l, &r),
                BinOp::Mul => scope.mul(ctx, &l, &r),
                BinOp::Div => scope.div(ctx, &l, &r),
                BinOp::Or | BinOp::And => Value::Null,
            }
        }
    }
}

/// Build the actual-args dict for a call: subqueries become stored-query
/// values, everything else a lazy expression, all bound to `scope`.
pub(crate) fn build_args_dict(scope: &Scope, args: &[Arg]) -> Dict {
    let mut dict = Dict::new();
    for arg in args {
        let value = match &arg.value {
            Expr::Subquery(sel) => stored_query(sel, scope),
            other => lazy_expr(other, scope),
        };
        dict.set(arg.name.clone(), value);
    }
    dict
}

fn eval_call(ctx: &EvalContext, scope: &Scope, call: &FnCall) -> Value {
    if let Some(function) = scope.get_function(&call.name) {
        let args = build_args_dict(scope, &call.args);
        let aggregate = function.is_aggregate();
        if aggregate {
            scope.push_call_site(call.to_string());
        }
        let result = catch_unwind(AssertUnwindSafe(|| function.call(ctx, scope, &args)));
        if aggregate {
            scope.pop_call_site();
        }
        match result {
            Ok(v) => v,
            Err(payload) => {
                scope.log(&format!("function {} panicked, returning NULL", call.name));
                if scope.options().strict_errors {
                    resume_unwind(payload);
                }
                Value::Null
            }
        }
    } else if let Some(binding) = scope.resolve(&call.name) {
        if let Value::Opaque(opaque) = &binding {
            if let Some(callable) = opaque.downcast_ref::<LetCallable>() {
                let args = build_args_dict(scope, &call.args);
                return callable.call_value(ctx, &args);
            }
        }
        reduce(ctx, binding)
    } else {
        scope.trace(&format!("function {} not found", call.name));
        Value::Null
    }
}

/// Resolve the FROM clause to a row stream: registered plugin first, then a
/// scope variable (stored query, sequence, or parameterized LET), else an
/// empty stream with a trace.
fn eval_from(ctx: &EvalContext, scope: &Scope, from: &FnCall) -> RowStream {
    let args = build_args_dict(scope, &from.args);
    if let Some(plugin) = scope.get_plugin(&from.name) {
        match catch_unwind(AssertUnwindSafe(|| plugin.call(ctx, scope, args))) {
            Ok(stream) => stream,
            Err(payload) => {
                scope.log(&format!("plugin {} panicked, yielding nothing", from.name));
                if scope.options().strict_errors {
                    resume_unwind(payload);
                }
                RowStream::empty()
            }
        }
    } else if let Some(binding) = scope.resolve(&from.name) {
        if let Value::Opaque(opaque) = &binding {
            if let Some(callable) = opaque.downcast_ref::<LetCallable>() {
                return callable.call_stream(ctx, &args);
            }
        }
        scope.iterate(ctx, &binding)
    } else {
        scope.trace(&format!("plugin {} not found", from.name));
        RowStream::empty()
    }
}

/// Evaluate a SELECT into a stream of rows. The pipeline runs on its own
/// thread; the returned stream is its bounded-channel consumer half.
pub fn eval_select(ctx: &EvalContext, scope: &Scope, select: Arc<Select>) -> RowStream {
    let child_scope = scope.copy();
    child_scope.set_agg_context(AggContext::new());
    let capacity = scope.options().channel_capacity;
    let (sender, stream) = RowStream::channel(capacity, ctx);
    let ctx_clone = ctx.clone();
    // Deep reductions (self-referential LETs run up to the depth ceiling)
    // unwind on this thread; give it headroom beyond the platform default.
    let spawned = thread::Builder::new()
        .name("vql-select".to_string())
        .stack_size(8 * 1024 * 1024)
        .spawn(move || {
            if catch_unwind(AssertUnwindSafe(|| {
                run_select(&ctx_clone, &child_scope, &select, &sender)
            }))
            .is_err()
            {
                tracing::warn!(target: "vql", "select pipeline panicked; stream closed early");
            }
        });
    if spawned.is_err() {
        tracing::warn!(target: "vql", "failed to spawn select pipeline thread");
    }
    stream
}

fn run_select(ctx: &EvalContext, scope: &Scope, select: &Select, out: &RowSender) {
    let source_ctx = ctx.child();
    let source = eval_from(&source_ctx, scope, &select.from);

    if let Some(group_expr) = &select.group_by {
        let mut rows = collect_grouped(ctx, scope, select, group_expr, source);
        if let Some(order) = &select.order_by {
            sort_rows(ctx, scope, &mut rows, order);
        }
        emit_limited(select.limit, rows, out);
        return;
    }

    if let Some(order) = &select.order_by {
        let mut rows = Vec::new();
        for row in source {
            if ctx.is_cancelled() {
                break;
            }
            if let Some(out_row) = transform_row(ctx, scope, select, row) {
                rows.push(out_row);
            }
        }
        sort_rows(ctx, scope, &mut rows, order);
        emit_limited(select.limit, rows, out);
        return;
    }

    let mut emitted = 0i64;
    for row in source {
        if ctx.is_cancelled() {
            break;
        }
        let Some(out_row) = transform_row(ctx, scope, select, row) else {
            continue;
        };
        if !out.send(out_row) {
            break;
        }
        emitted += 1;
        if let Some(limit) = select.limit {
            if emitted >= limit {
                break;
            }
        }
    }
    // LIMIT (or a dead consumer) stops the upstream promptly.
    source_ctx.cancel();
}

// Apply WHERE and build the projected row. Projected columns stay unreduced;
// WHERE sees both the source row and the projection, so aliases are
// addressable. Returns None for rows the filter rejects.
fn transform_row(ctx: &EvalContext, scope: &Scope, select: &Select, row: Dict) -> Option<Dict> {
    let row_scope = scope.copy();
    row_scope.append_vars(row.clone());

    let out_row = match &select.columns {
        Columns::Star => {
            let row_value = Value::Dict(row);
            let mut d = Dict::new();
            for member in row_scope.get_members(&row_value) {
                if let Some(v) =
                    row_scope.associative(ctx, &row_value, &Value::String(member.clone()))
                {
                    d.set(member, v);
                }
            }
            d
        }
        Columns::List(cols) => {
            let mut d = Dict::new();
            for col in cols {
                let name = col
                    .alias
                    .clone()
                    .unwrap_or_else(|| col.expr.to_string());
                d.set(name, lazy_expr(&col.expr, &row_scope));
            }
            d
        }
    };

    if let Some(where_expr) = &select.where_clause {
        let where_scope = row_scope.copy();
        where_scope.append_vars(out_row.clone());
        let verdict = eval_expr(ctx, &where_scope, where_expr);
        if !where_scope.as_bool(ctx, &verdict) {
            return None;
        }
    }

    Some(out_row)
}

// GROUP BY: buffer one row per group key (Eq-based, first-seen order). The
// projection is materialized eagerly per incoming row so aggregate functions
// accumulate against the group's context; the group's buffered row is the
// last one seen, whose aggregates then cover the whole group.
fn collect_grouped(
    ctx: &EvalContext,
    scope: &Scope,
    select: &Select,
    group_expr: &Expr,
    source: RowStream,
) -> Vec<Dict> {
    struct Group {
        key: Value,
        agg: Arc<AggContext>,
        row: Dict,
    }

    let mut groups: Vec<Group> = Vec::new();
    for row in source {
        if ctx.is_cancelled() {
            break;
        }

        let key_scope = scope.copy();
        key_scope.append_vars(row.clone());
        let key = key_scope.materialize(ctx, &eval_expr(ctx, &key_scope, group_expr));

        let existing = groups.iter().position(|g| scope.eq(ctx, &g.key, &key));
        let agg = match existing {
            Some(i) => groups[i].agg.clone(),
            None => AggContext::new(),
        };

        let group_scope = scope.copy();
        group_scope.set_agg_context(agg.clone());
        let Some(out_row) = transform_row(ctx, &group_scope, select, row) else {
            continue;
        };
        let materialized = match group_scope.materialize(ctx, &Value::Dict(out_row)) {
            Value::Dict(d) => d,
            _ => Dict::new(),
        };

        match existing {
            Some(i) => groups[i].row = materialized,
            None => groups.push(Group {
                key,
                agg,
                row: materialized,
            }),
        }
    }

    groups.into_iter().map(|g| g.row).collect()
}

// Stable sort on the reduced order key. Lt answers false both ways for
// non-comparable pairs, so those rank equal and keep input order; DESC flips
// the comparator rather than reversing the output, which keeps ties stable.
// Lt is not a total order, so std's sort (which may reject inconsistent
// comparators) is out; a stable insertion sort tolerates partial orders.
fn sort_rows(ctx: &EvalContext, scope: &Scope, rows: &mut Vec<Dict>, order: &OrderBy) {
    let mut keyed: Vec<(Value, Dict)> = rows
        .drain(..)
        .map(|row| {
            let row_scope = scope.copy();
            row_scope.append_vars(row.clone());
            let key = reduce(ctx, eval_expr(ctx, &row_scope, &order.expr));
            (key, row)
        })
        .collect();

    let less = |a: &Value, b: &Value| {
        if order.descending {
            scope.lt(ctx, b, a)
        } else {
            scope.lt(ctx, a, b)
        }
    };
    for i in 1..keyed.len() {
        let mut j = i;
        while j > 0 && less(&keyed[j].0, &keyed[j - 1].0) {
            keyed.swap(j - 1, j);
            j -= 1;
        }
    }

    rows.extend(keyed.into_iter().map(|(_, row)| row));
}

fn emit_limited(limit: Option<i64>, rows: Vec<Dict>, out: &RowSender) {
    let mut emitted = 0i64;
    for row in rows {
        if let Some(l) = limit {
            if emitted >= l {
                break;
            }
        }
        if !out.send(row) {
            break;
        }
        emitted += 1;
    }
}

/// Bind a LET statement into the scope.
pub fn eval_let(ctx: &EvalContext, scope: &Scope, stmt: &Let) {
    let value = if !stmt.parameters.is_empty() {
        Value::Opaque(OpaqueValue::new(LetCallable {
            parameters: stmt.parameters.clone(),
            body: stmt.body.clone(),
            scope: scope.clone(),
        }))
    } else {
        match &stmt.body {
            LetBody::Query(q) => {
                let stored = stored_query(q, scope);
                if stmt.materialized {
                    scope.materialize(ctx, &stored)
                } else {
                    stored
                }
            }
            LetBody::Expr(e) => {
                if stmt.materialized {
                    let v = eval_expr(ctx, scope, e);
                    scope.materialize(ctx, &v)
                } else {
                    Value::Lazy(LazyExpr::new(Arc::new(StoredExpression {
                        expr: e.clone(),
                        scope: scope.clone(),
                    })))
                }
            }
        }
    };
    scope.append_vars(Dict::new().with(stmt.name.clone(), value));
}

impl Select {
    /// Stream this SELECT's output rows.
    pub fn eval(&self, ctx: &EvalContext, scope: &Scope) -> RowStream {
        eval_select(ctx, scope, Arc::new(self.clone()))
    }

    /// Output column names. A `*` projection depends on the source rows and
    /// reports itself as `*`.
    pub fn columns(&self, _scope: &Scope) -> Vec<String> {
        match &self.columns {
            Columns::Star => vec!["*".to_string()],
            Columns::List(cols) => cols
                .iter()
                .map(|c| c.alias.clone().unwrap_or_else(|| c.expr.to_string()))
                .collect(),
        }
    }
}

impl VQL {
    /// Evaluate one statement. A LET binds into the scope and yields no
    /// rows; a SELECT streams.
    pub fn eval(&self, ctx: &EvalContext, scope: &Scope) -> RowStream {
        match self {
            VQL::Select(s) => s.eval(ctx, scope),
            VQL::Let(l) => {
                eval_let(ctx, scope, l);
                RowStream::empty()
            }
        }
    }

    pub fn columns(&self, scope: &Scope) -> Vec<String> {
        match self {
            VQL::Select(s) => s.columns(scope),
            VQL::Let(_) => Vec::new(),
        }
    }
}

/// Drain one statement into fully materialized rows. Test and host
/// convenience; the streaming API is [`VQL::eval`].
pub fn eval_to_rows(ctx: &EvalContext, scope: &Scope, vql: &VQL) -> Vec<Dict> {
    vql.eval(ctx, scope)
        .map(|row| match scope.materialize(ctx, &Value::Dict(row)) {
            Value::Dict(d) => d,
            _ => Dict::new(),
        })
        .collect()
}
