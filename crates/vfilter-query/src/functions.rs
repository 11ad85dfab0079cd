//! Built-in scalar functions

use crate::args::ArgMap;
use chrono::{LocalResult, TimeZone, Utc};
use std::sync::Arc;
use vfilter_core::{ArgDesc, Dict, EvalContext, FunctionInfo, Scope, Value, VqlFunction};

/// `dict(k=v, ...)`: echo the arguments back as an ordered dict. Argument
/// order becomes key order; stored-query arguments materialize.
pub struct DictFunction;

impl VqlFunction for DictFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "dict".to_string(),
            doc: "Construct a dict from the args.".to_string(),
            args: Vec::new(),
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let mut result = Dict::new();
        for (k, v) in args.iter() {
            result.set(k.clone(), scope.materialize(ctx, v));
        }
        Value::Dict(result)
    }
}

/// `if(condition=..., then=..., else=...)`: reduce the condition, then
/// reduce only the selected branch. The unselected branch is never touched.
pub struct IfFunction;

impl VqlFunction for IfFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "if".to_string(),
            doc: "Conditional with lazy branches.".to_string(),
            args: vec![
                ArgDesc::required("condition"),
                ArgDesc::optional("then"),
                ArgDesc::optional("else"),
            ],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(condition) = map.reduced("condition") else {
            scope.trace("required argument condition is missing");
            return Value::Null;
        };
        let branch = if scope.as_bool(ctx, &condition) {
            map.reduced("then")
        } else {
            map.reduced("else")
        };
        branch.unwrap_or(Value::Null)
    }
}

/// `split(string=..., sep=...)`: split on a regex separator.
pub struct SplitFunction;

impl VqlFunction for SplitFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "split".to_string(),
            doc: "Split a string into a sequence by a regex separator.".to_string(),
            args: vec![ArgDesc::required("string"), ArgDesc::required("sep")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let (Some(input), Some(sep)) = (map.required_string("string"), map.required_string("sep"))
        else {
            return Value::Null;
        };
        let Some(re) = scope.compile_regex(&sep, false) else {
            return Value::Null;
        };
        Value::Array(re.split(&input).map(Value::from).collect())
    }
}

/// `get(item=..., member='a.0.b', default=...)`: walk a dot-separated path
/// through dicts and sequences.
pub struct GetFunction;

impl VqlFunction for GetFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "get".to_string(),
            doc: "Fetch a nested member by dotted path.".to_string(),
            args: vec![
                ArgDesc::required("item"),
                ArgDesc::required("member"),
                ArgDesc::optional("default"),
            ],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let (Some(item), Some(member)) =
            (map.required_reduced("item"), map.required_string("member"))
        else {
            return Value::Null;
        };

        let mut current = item;
        for component in member.split('.') {
            let key = match component.parse::<i64>() {
                Ok(index) => Value::Int(index),
                Err(_) => Value::String(component.to_string()),
            };
            match scope.associative(ctx, &current, &key) {
                Some(next) => current = next,
                None => return map.reduced("default").unwrap_or(Value::Null),
            }
        }
        current
    }
}

/// `len(list=...)`: element count of a sequence or dict, byte length of a
/// string, 0 for anything else.
pub struct LenFunction;

impl VqlFunction for LenFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "len".to_string(),
            doc: "Length of a sequence, dict, or string.".to_string(),
            args: vec![ArgDesc::required("list")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(value) = map.materialized("list") else {
            scope.trace("required argument list is missing");
            return Value::Null;
        };
        match value {
            Value::Array(v) => Value::Int(v.len() as i64),
            Value::Dict(d) => Value::Int(d.len() as i64),
            Value::String(s) => Value::Int(s.len() as i64),
            _ => Value::Int(0),
        }
    }
}

/// `timestamp(epoch=...)`: seconds since the Unix epoch to an RFC 3339
/// string.
pub struct TimestampFunction;

impl VqlFunction for TimestampFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "timestamp".to_string(),
            doc: "Convert an epoch seconds value to a timestamp.".to_string(),
            args: vec![ArgDesc::required("epoch")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let Some(epoch) = map.required_float("epoch") else {
            return Value::Null;
        };
        let secs = epoch.trunc() as i64;
        let nanos = (epoch.fract().abs() * 1e9) as u32;
        match Utc.timestamp_opt(secs, nanos) {
            LocalResult::Single(dt) => Value::String(dt.to_rfc3339()),
            _ => Value::Null,
        }
    }
}

/// `encode(string=..., type='json'|'hex'|'string')`.
pub struct EncodeFunction;

impl VqlFunction for EncodeFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "encode".to_string(),
            doc: "Encode a value as json, hex, or plain string.".to_string(),
            args: vec![ArgDesc::required("string"), ArgDesc::required("type")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        let (Some(value), Some(kind)) = (
            map.materialized("string"),
            map.required_string("type"),
        ) else {
            return Value::Null;
        };
        match kind.as_str() {
            "json" => match serde_json::to_string_pretty(&value) {
                Ok(s) => Value::String(s),
                Err(_) => Value::Null,
            },
            "hex" => match &value {
                Value::String(s) => {
                    Value::String(s.bytes().map(|b| format!("{b:02x}")).collect())
                }
                _ => Value::Null,
            },
            "string" | "utf8" => match value {
                Value::String(s) => Value::String(s),
                other => match serde_json::to_string(&other) {
                    Ok(s) => Value::String(s),
                    Err(_) => Value::Null,
                },
            },
            other => {
                scope.trace(&format!("encode: unknown type {other}"));
                Value::Null
            }
        }
    }
}

/// `query(vql={ SELECT ... })`: run a subquery and materialize its rows.
pub struct QueryFunction;

impl VqlFunction for QueryFunction {
    fn info(&self) -> FunctionInfo {
        FunctionInfo {
            name: "query".to_string(),
            doc: "Materialize a subquery into a sequence of rows.".to_string(),
            args: vec![ArgDesc::required("vql")],
        }
    }

    fn call(&self, ctx: &EvalContext, scope: &Scope, args: &Dict) -> Value {
        let map = ArgMap::new(ctx, scope, args);
        if !map.present("vql") {
            scope.trace("required argument vql is missing");
            return Value::Null;
        }
        map.materialized("vql").unwrap_or(Value::Null)
    }
}

pub fn builtin_functions() -> Vec<Arc<dyn VqlFunction>> {
    vec![
        Arc::new(DictFunction),
        Arc::new(IfFunction),
        Arc::new(SplitFunction),
        Arc::new(GetFunction),
        Arc::new(LenFunction),
        Arc::new(TimestampFunction),
        Arc::new(EncodeFunction),
        Arc::new(QueryFunction),
    ]
}
