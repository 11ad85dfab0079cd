//! End-to-end query corpus
//!
//! Exercises the full pipeline: where-clause reduction over a populated
//! scope, rendering round trips, streaming queries with plugins, LET
//! semantics, grouping, ordering, and limits.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vfilter_core::{
    ArgDesc, Dict, EvalContext, FunctionInfo, GenericListPlugin, Plugin, PluginInfo, RowStream,
    Scope, Value, VqlFunction,
};
use vfilter_query::args::{ArgMap, FromArgs};
use vfilter_query::{eval_expr, eval_to_rows, new_scope, parse, VQL};

// func_foo: returns its `return` argument reduced, or a fixed default.
struct TestFunction {
    default: Value,
}

impl VqlFunction for TestFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "func_foo".to_string(),
            doc: String::new(),
            args: vec![ArgDesc::optional("return")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        if map.present("return") {
            map.reduced("return").unwrap_or(Value::Null)
        } else {
            self.default.clone()
        }
    }
}

// counter: increments shared state on every reduction.
struct CounterFunction {
    count: Arc<AtomicI64>,
}

impl VqlFunction for CounterFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "counter".to_string(),
            doc: String::new(),
            args: Vec::new(),
        }
    }

    fn call(&self, _ctx: &EvalContext, _scope: &Scope, _args: &Dict) -> Value {
        Value::Int(self.count.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

// panic: records then panics when column equals value. The recording makes
// the lazy-row property observable even in tolerant error mode.
struct PanicFunction {
    fired: Arc<AtomicI64>,
}

impl VqlFunction for PanicFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "panic".to_string(),
            doc: String::new(),
            args: vec![ArgDesc::optional("column"), ArgDesc::optional("value")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let column = map.reduced("column").unwrap_or(Value::Null);
        let value = map.reduced("value").unwrap_or(Value::Null);
        if scope.eq(ctx, &column, &value) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            panic!("panic because I got {value:?}");
        }
        value
    }
}

// sleep: records invocations; used to observe short-circuiting.
struct SleepFunction {
    called: Arc<AtomicI64>,
}

impl VqlFunction for SleepFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "sleep".to_string(),
            doc: String::new(),
            args: vec![ArgDesc::optional("a")],
        }
    }

    fn call(&self, _ctx: &EvalContext, _scope: &Scope, _args: &Dict) -> Value {
        self.called.fetch_add(1, Ordering::SeqCst);
        Value::Int(0)
    }
}

// An unbounded row source; only LIMIT/cancellation ends it.
struct InfinitePlugin;

impl Plugin for InfinitePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: "forever".to_string(),
            doc: String::new(),
            args: Vec::new(),
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, _args: Dict) -> RowStream {
        RowStream::spawn(ctx, scope.options().channel_capacity, |sender| {
            let mut i = 0i64;
            while sender.send(Dict::new().with("i", i)) {
                i += 1;
            }
        })
    }
}

struct RangeArgs {
    start: i64,
    end: i64,
}

impl FromArgs for RangeArgs {
    fn from_args(args: &ArgMap<'_>) -> Option<Self> {
        Some(Self {
            start: args.required_int("start")?,
            end: args.required_int("end")?,
        })
    }
}

struct Harness {
    ctx: EvalContext,
    scope: Scope,
    counter: Arc<AtomicI64>,
    panics: Arc<AtomicI64>,
    sleeps: Arc<AtomicI64>,
}

impl Harness {
    fn new() -> Self {
        // RUST_LOG=vql=trace surfaces resolution misses and protocol
        // fallbacks while debugging a failing case.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let counter = Arc::new(AtomicI64::new(0));
        let panics = Arc::new(AtomicI64::new(0));
        let sleeps = Arc::new(AtomicI64::new(0));

        let scope = new_scope();
        scope.append_vars(
            Dict::new()
                .with("const_foo", 1)
                .with("my_list_obj", Dict::new().with("my_list", vec![1i64, 2, 3]))
                .with("env_var", "EnvironmentData")
                .with(
                    "foo",
                    Dict::new()
                        .with("bar", Dict::new().with("baz", 5))
                        .with("bar2", 7),
                ),
        );

        scope.append_function(TestFunction {
            default: Value::Int(1),
        });
        scope.append_function(CounterFunction {
            count: counter.clone(),
        });
        scope.append_function(PanicFunction {
            fired: panics.clone(),
        });
        scope.append_function(SleepFunction {
            called: sleeps.clone(),
        });

        scope.append_plugin(GenericListPlugin::new("test", |_ctx, _scope, _args| {
            (0..3)
                .map(|i| Dict::new().with("foo", i * 2).with("bar", i))
                .collect()
        }));
        scope.append_plugin(GenericListPlugin::new("range", |ctx, scope, args| {
            let map = ArgMap::new(ctx, scope, args);
            let Some(range) = RangeArgs::from_args(&map) else {
                return Vec::new();
            };
            (range.start..=range.end)
                .map(|i| Dict::new().with("value", i))
                .collect()
        }));
        scope.append_plugin(
            GenericListPlugin::new("dict", |ctx, scope, args| {
                let mut row = Dict::new();
                for (k, v) in args.iter() {
                    row.set(k.clone(), scope.materialize(ctx, v));
                }
                vec![row]
            })
            .with_doc("Just echo back the args as a dict."),
        );
        scope.append_plugin(GenericListPlugin::new("groupbytest", |_ctx, _scope, _args| {
            vec![
                Dict::new().with("foo", 1).with("bar", 5).with("baz", "a"),
                Dict::new().with("foo", 2).with("bar", 5).with("baz", "b"),
                Dict::new().with("foo", 3).with("bar", 2).with("baz", "c"),
                Dict::new().with("foo", 4).with("bar", 2).with("baz", "d"),
            ]
        }));
        scope.append_plugin(InfinitePlugin);

        Self {
            ctx: EvalContext::new(),
            scope,
            counter,
            panics,
            sleeps,
        }
    }

    fn run(&self, query: &str) -> Vec<Dict> {
        let vql = parse(query).unwrap_or_else(|e| panic!("failed to parse {query:?}: {e}"));
        eval_to_rows(&self.ctx, &self.scope, &vql)
    }

    fn run_json(&self, query: &str) -> serde_json::Value {
        serde_json::to_value(self.run(query)).unwrap()
    }

    fn reduce_clause(&self, clause: &str) -> Value {
        let source = format!("select * from plugin() where \n{clause}");
        let vql = parse(&source).unwrap_or_else(|e| panic!("failed to parse {clause:?}: {e}"));
        let VQL::Select(select) = vql else {
            panic!("expected a select for {clause:?}");
        };
        let where_clause = select.where_clause.expect("where clause");
        eval_expr(&self.ctx, &self.scope, &where_clause)
    }
}

fn exec_table() -> Vec<(&'static str, Value)> {
    let b = Value::Bool;
    let i = Value::Int;
    vec![
        ("1 or sleep(a=100)", b(true)),
        // Arithmetic
        ("1", i(1)),
        ("0 or 3", b(true)),
        ("1 and 3", b(true)),
        ("1 = TRUE", b(true)),
        ("0 = FALSE", b(true)),
        ("1.5", Value::Float(1.5)),
        ("2 - 1", i(1)),
        ("1 + 2", i(3)),
        ("1 + 2.0", i(3)),
        ("1 + -2", i(-1)),
        ("1 + (1 + 2) * 5", i(16)),
        ("1 + (2 + 2) / 2", i(3)),
        ("(1 + 2 + 3) + 1", i(7)),
        ("(1 + 2 - 3) + 1", i(1)),
        // Precedence
        ("1 + 2 * 4", i(9)),
        ("1 and 2 * 4", b(true)),
        ("1 and 2 * 0", b(false)),
        // AND binds tighter than OR.
        ("false and 5 or 4", b(true)),
        ("(false and 5) or 4", b(true)),
        ("false and (5 or 4)", b(false)),
        // Division by zero and type faults collapse to NULL.
        ("10 / 0", Value::Null),
        ("1 + 'foo'", Value::Null),
        ("'foo' - 'bar'", Value::Null),
        // Logical operators
        ("1 and 2 and 3 and 4", b(true)),
        ("1 and (2 = 1 + 1) and 3", b(true)),
        ("1 and (2 = 1 + 2) and 3", b(false)),
        ("1 and func_foo(return=FALSE) and 3", b(false)),
        (
            "func_foo(return=FALSE) or func_foo(return=2) or func_foo(return=FALSE)",
            b(true),
        ),
        // String concat
        ("'foo' + 'bar'", Value::String("foobar".to_string())),
        ("'foo' + 'bar' = 'foobar'", b(true)),
        ("5 * func_foo()", i(5)),
        // Equality
        ("const_foo = 1", b(true)),
        ("const_foo != 2", b(true)),
        ("func_foo() = 1", b(true)),
        ("func_foo() = func_foo()", b(true)),
        ("1 = const_foo", b(true)),
        // Large integers stay exact.
        ("281462092005375 = 65535 * 65535 * 65535", b(true)),
        // Ordering
        ("const_foo > 1", b(false)),
        ("const_foo < 2", b(true)),
        ("func_foo() >= 1", b(true)),
        ("func_foo() > 1", b(false)),
        ("func_foo() < func_foo()", b(false)),
        ("1 <= const_foo", b(true)),
        ("1 >= TRUE", b(true)),
        // Callables
        ("func_foo(return =1)", i(1)),
        ("func_foo(return =1) = 1", b(true)),
        ("func_foo(return =1 + 2)", i(3)),
        ("func_foo(return = (1 + (2 + 3) * 3))", i(16)),
        ("func_foo(return = (1 + func_foo(return=2 + 3)))", i(6)),
        // Arrays
        ("(1, 2, 3, 4)", Value::from(vec![1i64, 2, 3, 4])),
        (
            "(1, 2.2, 3, 4)",
            Value::Array(vec![
                Value::Float(1.0),
                Value::Float(2.2),
                Value::Float(3.0),
                Value::Float(4.0),
            ]),
        ),
        ("2 in (1, 2, 3, 4)", b(true)),
        ("(1, 2, 3) = (1, 2, 3)", b(true)),
        ("(1, 2, 3) != (2, 3)", b(true)),
        ("(0x10, 0x20, 070, -4)", Value::from(vec![16i64, 32, 56, -4])),
        // Dicts
        ("dict(foo=1) = dict(foo=1)", b(true)),
        ("dict(foo=1)", Value::Dict(Dict::new().with("foo", 1))),
        ("dict(foo=1.0)", Value::Dict(Dict::new().with("foo", 1.0))),
        (
            "dict(foo=1, bar=2)",
            Value::Dict(Dict::new().with("foo", 1).with("bar", 2)),
        ),
        (
            "dict(foo=1, bar=2, baz=3)",
            Value::Dict(Dict::new().with("foo", 1).with("bar", 2).with("baz", 3)),
        ),
        // Expression as parameter
        (
            "dict(foo=1, bar=( 2 + 3 ))",
            Value::Dict(Dict::new().with("foo", 1).with("bar", 5)),
        ),
        // Mixing floats and ints
        (
            "dict(foo=1.0, bar=( 2.1 + 3 ))",
            Value::Dict(Dict::new().with("foo", 1.0).with("bar", 5.1)),
        ),
        // List as parameter
        (
            "dict(foo=1, bar= [2 , 3] )",
            Value::Dict(
                Dict::new()
                    .with("foo", 1)
                    .with("bar", vec![2i64, 3]),
            ),
        ),
        // Associative access over the pre-populated scope.
        ("foo.bar.baz, foo.bar2", Value::from(vec![5i64, 7])),
        ("dict(foo=dict(bar=5)).foo.bar", i(5)),
        ("1, dict(foo=5).foo", Value::from(vec![1i64, 5])),
        // Array indexes
        ("my_list_obj.my_list[2]", i(3)),
        ("my_list_obj.my_list[1]", i(2)),
    ]
}

#[test]
fn test_where_clause_reduction_table() {
    let h = Harness::new();
    for (clause, expected) in exec_table() {
        let got = h.reduce_clause(clause);
        assert!(
            h.scope.eq(&h.ctx, &got, &expected),
            "{clause}: expected {expected:?}, got {got:?}"
        );
    }
}

#[test]
fn test_where_clause_round_trip() {
    for (clause, _) in exec_table() {
        let source = format!("select * from plugin() where \n{clause}");
        let vql = parse(&source).unwrap();
        let rendered = vql.to_string();
        let reparsed = parse(&rendered)
            .unwrap_or_else(|e| panic!("failed to reparse {rendered:?}: {e}"));
        assert_eq!(vql, reparsed, "round trip failed for {clause:?}");
    }
}

#[test]
fn test_short_circuit_does_not_reduce_right_side() {
    let h = Harness::new();
    assert_eq!(h.reduce_clause("1 or sleep(a=100)"), Value::Bool(true));
    assert_eq!(h.reduce_clause("0 and sleep(a=100)"), Value::Bool(false));
    assert_eq!(h.sleeps.load(Ordering::SeqCst), 0);

    // Sanity: the function does run when the left side does not decide.
    assert_eq!(h.reduce_clause("0 or sleep(a=1)"), Value::Bool(false));
    assert_eq!(h.sleeps.load(Ordering::SeqCst), 1);
}

#[test]
fn test_simple_queries() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select * from test()"),
        serde_json::json!([
            {"foo": 0, "bar": 0},
            {"foo": 2, "bar": 1},
            {"foo": 4, "bar": 2},
        ])
    );
    assert_eq!(
        h.run_json("select * from range(start=1, end=4)"),
        serde_json::json!([
            {"value": 1}, {"value": 2}, {"value": 3}, {"value": 4},
        ])
    );
}

#[test]
fn test_aliases_and_shadowing() {
    let h = Harness::new();
    // The plugin's foo column shadows the environment's foo.
    assert_eq!(
        h.run_json("select env_var as EnvVar, foo as FooColumn from test()"),
        serde_json::json!([
            {"EnvVar": "EnvironmentData", "FooColumn": 0},
            {"EnvVar": "EnvironmentData", "FooColumn": 2},
            {"EnvVar": "EnvironmentData", "FooColumn": 4},
        ])
    );
    // The range plugin emits no foo, so the environment's foo shows through.
    assert_eq!(
        h.run_json("select foo as FooColumn from range(start=1, end=2)"),
        serde_json::json!([
            {"FooColumn": {"bar": {"baz": 5}, "bar2": 7}},
            {"FooColumn": {"bar": {"baz": 5}, "bar2": 7}},
        ])
    );
}

#[test]
fn test_where_over_aliases_and_source_columns() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select foo as FooColumn from test() where FooColumn = 2"),
        serde_json::json!([{"FooColumn": 2}])
    );
    assert_eq!(
        h.run_json("select foo as FooColumn from test() where NOT FooColumn = 2"),
        serde_json::json!([{"FooColumn": 0}, {"FooColumn": 4}])
    );
    assert_eq!(
        h.run_json("select foo as FooColumn from test() where foo = 4"),
        serde_json::json!([{"FooColumn": 4}])
    );
    assert_eq!(
        h.run_json("select * from test() WHERE 1 and not foo = 2"),
        serde_json::json!([{"foo": 0, "bar": 0}, {"foo": 4, "bar": 2}])
    );
    assert_eq!(
        h.run_json("select * from test() WHERE 0 and not foo = 2"),
        serde_json::json!([])
    );
    assert_eq!(
        h.run_json("select * from test() WHERE 1 or not foo = 20"),
        serde_json::json!([
            {"foo": 0, "bar": 0},
            {"foo": 2, "bar": 1},
            {"foo": 4, "bar": 2},
        ])
    );
}

#[test]
fn test_dict_plugin_and_resolution_misses() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select * from dict(env_var=15, foo=5)"),
        serde_json::json!([{"env_var": 15, "foo": 5}])
    );
    // Unknown columns resolve to NULL, and NULL poisons arithmetic.
    assert_eq!(
        h.run_json("select no_such_column from dict(env_var=15, foo=5)"),
        serde_json::json!([{"no_such_column": null}])
    );
    assert_eq!(
        h.run_json("select no_such_column + 'foo' as Col from dict(env_var=15, foo=5)"),
        serde_json::json!([{"Col": null}])
    );
    // Mix environment and plugin values.
    assert_eq!(
        h.run_json("select env_var + param as ConCat from dict(param='param')"),
        serde_json::json!([{"ConCat": "EnvironmentDataparam"}])
    );
    // Unknown plugins yield an empty stream, not an error.
    assert_eq!(h.run_json("select * from no_such_result"), serde_json::json!([]));
    assert_eq!(
        h.run_json("select foobar from no_such_result"),
        serde_json::json!([])
    );
}

#[test]
fn test_subquery_values() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select param from dict(param={select * from range(start=3, end=5)})"),
        serde_json::json!([
            {"param": [{"value": 3}, {"value": 4}, {"value": 5}]}
        ])
    );
    // Adding materialized subqueries concatenates their column sequences.
    assert_eq!(
        h.run_json(
            "select q1.value + q2.value as Sum from \
             dict(q1={select * from range(start=3, end=5)}, \
                  q2={select * from range(start=10, end=14)})"
        ),
        serde_json::json!([{"Sum": [3, 4, 5, 10, 11, 12, 13, 14]}])
    );
    assert_eq!(
        h.run_json("select func_foo(return=q1 + 4) from dict(q1=3)"),
        serde_json::json!([{"func_foo(return=q1 + 4)": 7}])
    );
}

#[test]
fn test_query_function() {
    let h = Harness::new();
    assert_eq!(
        h.run_json(
            "select bar, query(vql={select * from dict(column=bar)}) as Query from test()"
        ),
        serde_json::json!([
            {"bar": 0, "Query": [{"column": 0}]},
            {"bar": 1, "Query": [{"column": 1}]},
            {"bar": 2, "Query": [{"column": 2}]},
        ])
    );
    assert_eq!(
        h.run_json(
            "select bar, query(vql={select * from dict(column=bar)}) as Query \
             from test() where 1 in Query.column"
        ),
        serde_json::json!([{"bar": 1, "Query": [{"column": 1}]}])
    );
    assert_eq!(
        h.run_json(
            "select bar, { select column from dict(column=bar) } AS subquery from test()"
        ),
        serde_json::json!([
            {"bar": 0, "subquery": [{"column": 0}]},
            {"bar": 1, "subquery": [{"column": 1}]},
            {"bar": 2, "subquery": [{"column": 2}]},
        ])
    );
}

#[test]
fn test_let_lazy_vs_materialized() {
    let h = Harness::new();
    assert_eq!(h.counter.load(Ordering::SeqCst), 0);

    // Running a query directly evaluates.
    h.run("SELECT counter() FROM scope()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 1);

    // Just storing the query does not evaluate.
    h.run("LET stored = SELECT counter() from scope()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 1);

    // Each reference to the stored query evaluates afresh.
    h.run("SELECT * FROM stored");
    assert_eq!(h.counter.load(Ordering::SeqCst), 2);
    h.run("SELECT * FROM stored");
    assert_eq!(h.counter.load(Ordering::SeqCst), 3);

    // Materializing evaluates once at the LET.
    h.run("LET materialized <= SELECT counter() from scope()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 4);

    // Expanding a materialized binding does not evaluate again.
    h.run("SELECT * FROM materialized");
    h.run("SELECT * FROM materialized");
    assert_eq!(h.counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_let_expression_bindings() {
    let h = Harness::new();

    // A lazy expression binding re-reduces on every reference.
    h.run("LET x = counter()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 0);
    h.run("SELECT x FROM scope()");
    h.run("SELECT x FROM scope()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 2);

    // A materialized expression binding reduces exactly once.
    h.run("LET y <= counter()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 3);
    h.run("SELECT y FROM scope()");
    h.run("SELECT y FROM scope()");
    assert_eq!(h.counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_let_callables() {
    let h = Harness::new();
    h.run("LET f(a, b) = a + b");
    assert_eq!(
        h.run_json("select f(a=1, b=2) as Sum from scope()"),
        serde_json::json!([{"Sum": 3}])
    );

    h.run("LET g(x) = SELECT x + value as v FROM range(start=1, end=2)");
    assert_eq!(
        h.run_json("select * from g(x=10)"),
        serde_json::json!([{"v": 11}, {"v": 12}])
    );
}

#[test]
fn test_foreach() {
    let h = Harness::new();
    assert_eq!(
        h.run_json(
            "select * from foreach(row={select * from test()}, \
             query={select bar, foo, value from range(start=bar, end=foo)})"
        ),
        serde_json::json!([
            {"bar": 0, "foo": 0, "value": 0},
            {"bar": 1, "foo": 2, "value": 1},
            {"bar": 1, "foo": 2, "value": 2},
            {"bar": 2, "foo": 4, "value": 2},
            {"bar": 2, "foo": 4, "value": 3},
            {"bar": 2, "foo": 4, "value": 4},
        ])
    );
}

#[test]
fn test_chain_and_flatten() {
    let h = Harness::new();
    assert_eq!(
        h.run_json(
            "select * from chain(a={select * from range(start=1, end=2)}, \
             b={select * from range(start=10, end=11)})"
        ),
        serde_json::json!([
            {"value": 1}, {"value": 2}, {"value": 10}, {"value": 11},
        ])
    );
    assert_eq!(
        h.run_json("select * from flatten(query={select * from dict(a=[1, 2], b='x')})"),
        serde_json::json!([
            {"a": 1, "b": "x"},
            {"a": 2, "b": "x"},
        ])
    );
}

#[test]
fn test_if_plugin_and_function() {
    let h = Harness::new();
    assert_eq!(
        h.run_json(
            "select * from if(condition=1, then={select * from range(start=1, end=2)}, \
             else={select * from range(start=8, end=9)})"
        ),
        serde_json::json!([{"value": 1}, {"value": 2}])
    );
    assert_eq!(
        h.run_json(
            "select * from if(condition=0, then={select * from range(start=1, end=2)}, \
             else={select * from range(start=8, end=9)})"
        ),
        serde_json::json!([{"value": 8}, {"value": 9}])
    );
    assert_eq!(
        h.run_json("select if(condition=1, then='yes', else='no') as R from scope()"),
        serde_json::json!([{"R": "yes"}])
    );
    // The unselected branch is never reduced.
    h.run("select if(condition=1, then='yes', else=sleep(a=1)) as R from scope()");
    assert_eq!(h.sleeps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dotted_plugin_name_resolution_miss() {
    let h = Harness::new();
    // Not registered: empty stream rather than an error.
    assert_eq!(
        h.run_json("Select * from Artifact.Linux.Sys()"),
        serde_json::json!([])
    );
}

#[test]
fn test_order_by_and_limit() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select * from test() order by foo"),
        serde_json::json!([
            {"foo": 0, "bar": 0},
            {"foo": 2, "bar": 1},
            {"foo": 4, "bar": 2},
        ])
    );
    assert_eq!(
        h.run_json("select * from test() order by foo DESC"),
        serde_json::json!([
            {"foo": 4, "bar": 2},
            {"foo": 2, "bar": 1},
            {"foo": 0, "bar": 0},
        ])
    );
    assert_eq!(
        h.run_json("select * from test() limit 1"),
        serde_json::json!([{"foo": 0, "bar": 0}])
    );
    assert_eq!(
        h.run_json("select * from test() order by foo desc limit 1"),
        serde_json::json!([{"foo": 4, "bar": 2}])
    );
}

#[test]
fn test_order_by_desc_is_reverse_of_asc_on_unique_keys() {
    let h = Harness::new();
    let mut asc = h.run("select * from test() order by foo");
    let desc = h.run("select * from test() order by foo DESC");
    asc.reverse();
    assert_eq!(asc, desc);
}

#[test]
fn test_order_by_non_comparable_keys_keeps_input_order() {
    let h = Harness::new();
    // Key reduces to a string for one row and an int for the others; the
    // non-comparable pairs rank equal and the stable sort keeps input order
    // among them.
    assert_eq!(
        h.run_json(
            "select * from chain(a={select 'x' as k from scope()}, \
             b={select 2 as k from scope()}, c={select 1 as k from scope()}) \
             order by k"
        ),
        serde_json::json!([{"k": "x"}, {"k": 1}, {"k": 2}])
    );
}

#[test]
fn test_limit_cancels_unbounded_source() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select * from forever() limit 3"),
        serde_json::json!([{"i": 0}, {"i": 1}, {"i": 2}])
    );
}

#[test]
fn test_comments() {
    let h = Harness::new();
    for q in [
        "// This is a single line comment\nselect * from test() limit 1",
        "-- This is a single line comment in sql style\nselect * from test() limit 1",
        "/* This is a multiline comment\nthis is the rest of the comment */\nselect * from test() limit 1",
    ] {
        assert_eq!(h.run_json(q), serde_json::json!([{"foo": 0, "bar": 0}]));
    }
}

#[test]
fn test_group_by() {
    let h = Harness::new();
    // One row per group, last row wins, first-seen key order.
    assert_eq!(
        h.run_json("select foo, bar from groupbytest() GROUP BY bar"),
        serde_json::json!([{"foo": 2, "bar": 5}, {"foo": 4, "bar": 2}])
    );
    // Re-grouping an already grouped result on the same key is a no-op.
    h.run("LET g1 = select foo, bar from groupbytest() GROUP BY bar");
    assert_eq!(
        h.run_json("select foo, bar from g1 GROUP BY bar"),
        h.run_json("select foo, bar from groupbytest() GROUP BY bar"),
    );
}

#[test]
fn test_group_by_aggregates() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select foo, bar, count(items=bar) as c from groupbytest() GROUP BY bar"),
        serde_json::json!([
            {"foo": 2, "bar": 5, "c": 2},
            {"foo": 4, "bar": 2, "c": 2},
        ])
    );
    assert_eq!(
        h.run_json(
            "select foo, bar, count(items=bar) as c from groupbytest() \
             WHERE foo < 4 GROUP BY bar"
        ),
        serde_json::json!([
            {"foo": 2, "bar": 5, "c": 2},
            {"foo": 3, "bar": 2, "c": 1},
        ])
    );
    assert_eq!(
        h.run_json("select foo, bar, min(items=foo) as m from groupbytest() GROUP BY bar"),
        serde_json::json!([
            {"foo": 2, "bar": 5, "m": 1},
            {"foo": 4, "bar": 2, "m": 3},
        ])
    );
    assert_eq!(
        h.run_json("select foo, bar, max(items=foo) as m from groupbytest() GROUP BY bar"),
        serde_json::json!([
            {"foo": 2, "bar": 5, "m": 2},
            {"foo": 4, "bar": 2, "m": 4},
        ])
    );
    assert_eq!(
        h.run_json("select baz, bar, max(items=baz) as m from groupbytest() GROUP BY bar"),
        serde_json::json!([
            {"baz": "b", "bar": 5, "m": "b"},
            {"baz": "d", "bar": 2, "m": "d"},
        ])
    );
    assert_eq!(
        h.run_json("select baz, bar, min(items=baz) as m from groupbytest() GROUP BY bar"),
        serde_json::json!([
            {"baz": "b", "bar": 5, "m": "a"},
            {"baz": "d", "bar": 2, "m": "c"},
        ])
    );
    assert_eq!(
        h.run_json(
            "select baz, bar, enumerate(items=baz) as e from groupbytest() GROUP BY bar"
        ),
        serde_json::json!([
            {"baz": "b", "bar": 5, "e": ["a", "b"]},
            {"baz": "d", "bar": 2, "e": ["c", "d"]},
        ])
    );
}

#[test]
fn test_lazy_row_evaluation() {
    let h = Harness::new();
    // panic(column=foo, value=2) would fire on the foo=2 row, but that row
    // is filtered out by WHERE before any projection is reduced.
    assert_eq!(
        h.run_json("select foo, panic(column=foo, value=2) as P from test() where foo = 4"),
        serde_json::json!([{"foo": 4, "P": 2}])
    );
    assert_eq!(h.panics.load(Ordering::SeqCst), 0);
}

#[test]
fn test_self_referential_let_hits_depth_ceiling() {
    let h = Harness::new();
    h.run("LET x = x + 1");
    assert_eq!(
        h.run_json("select x from scope()"),
        serde_json::json!([{"x": null}])
    );
}

#[test]
fn test_string_quoting_and_get() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select 'foo\\'s quote' as Q from scope()"),
        serde_json::json!([{"Q": "foo's quote"}])
    );
    assert_eq!(
        h.run_json(
            "select get(item=[dict(foo=3), 2, 3, 4], member='0.foo') AS Foo from scope()"
        ),
        serde_json::json!([{"Foo": 3}])
    );
}

#[test]
fn test_builtin_scalar_functions() {
    let h = Harness::new();
    assert_eq!(
        h.run_json("select split(string='a,b,c', sep=',') as S from scope()"),
        serde_json::json!([{"S": ["a", "b", "c"]}])
    );
    assert_eq!(
        h.run_json("select len(list=[1, 2, 3]) as L, len(list='abcd') as S from scope()"),
        serde_json::json!([{"L": 3, "S": 4}])
    );
    assert_eq!(
        h.run_json("select timestamp(epoch=0) as T from scope()"),
        serde_json::json!([{"T": "1970-01-01T00:00:00+00:00"}])
    );
    assert_eq!(
        h.run_json("select encode(string='ab', type='hex') as H from scope()"),
        serde_json::json!([{"H": "6162"}])
    );
    assert_eq!(
        h.run_json("select 'foobar' =~ 'OOB' as M, 'foobar' =~ 'xyz' as N from scope()"),
        serde_json::json!([{"M": true, "N": false}])
    );
}

#[test]
fn test_iterate_env_sequence_and_columns_api() {
    let h = Harness::new();
    h.scope.append_vars(Dict::new().with(
        "TestDict",
        Value::Array(vec![Value::Dict(Dict::new().with("Field", 2))]),
    ));
    assert_eq!(
        h.run_json("select Field from TestDict"),
        serde_json::json!([{"Field": 2}])
    );
    assert_eq!(
        h.run_json("select * from TestDict"),
        serde_json::json!([{"Field": 2}])
    );

    let vql = parse("select foo, bar as B from test()").unwrap();
    assert_eq!(vql.columns(&h.scope), vec!["foo", "B"]);
    let star = parse("select * from test()").unwrap();
    assert_eq!(star.columns(&h.scope), vec!["*"]);
}

#[test]
fn test_query_corpus_round_trip() {
    let corpus = [
        "select * from test()",
        "select * from range(start=10, end=12)",
        "select env_var as EnvVar, foo as FooColumn from test()",
        "select foo as FooColumn from range(start=1, end=2)",
        "select foo as FooColumn from test() where FooColumn = 2",
        "select foo as FooColumn from test() where NOT FooColumn = 2",
        "select foo as FooColumn from test() where foo = 4",
        "select * from dict(env_var=15, foo=5)",
        "select no_such_column from dict(env_var=15, foo=5)",
        "select no_such_column + 'foo' from dict(env_var=15, foo=5)",
        "select env_var + param as ConCat from dict(param='param')",
        "select param from dict(param={select * from range(start=3, end=5)})",
        "select func_foo(return=q1 + 4) from dict(q1=3)",
        "select bar, query(vql={select * from dict(column=bar)}) as Query from test()",
        "let result = select * from test()",
        "let result <= select * from test()",
        "select * from result",
        "select * from no_such_result",
        "select foobar from no_such_result",
        "select * from foreach(row={select * from test()}, query={select bar, foo, value from range(start=bar, end=foo)})",
        "Select * from Artifact.Linux.Sys()",
        "select * from test() order by foo",
        "select * from test() order by foo DESC",
        "select * from test() limit 1",
        "select * from test() order by foo desc limit 1",
        "select * from test() WHERE 1 and not foo = 2",
        "select foo, bar from groupbytest() GROUP BY bar",
        "select foo, bar, count(items=bar) from groupbytest() GROUP BY bar",
        "select foo, bar, count(items=bar) from groupbytest() WHERE foo < 4 GROUP BY bar",
        "select baz, bar, enumerate(items=baz) from groupbytest() GROUP BY bar",
        "select foo, panic(column=foo, value=2) from test() where foo = 4",
        "select 'foo\\'s quote' from scope()",
        "select get(item=[dict(foo=3), 2, 3, 4], member='0.foo') AS Foo from scope()",
        "let f(a, b) = a + b",
    ];
    for q in corpus {
        let vql = parse(q).unwrap_or_else(|e| panic!("failed to parse {q:?}: {e}"));
        let rendered = vql.to_string();
        let reparsed = parse(&rendered)
            .unwrap_or_else(|e| panic!("failed to reparse {rendered:?}: {e}"));
        assert_eq!(vql, reparsed, "round trip failed: {q:?} -> {rendered:?}");
    }
}
