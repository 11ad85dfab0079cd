//! The runtime value model
//!
//! A [`Value`] is a tagged variant with a small closed set of built-in tags
//! plus an opaque escape hatch for host data. Null is the single distinguished
//! absent value: arithmetic faults, missing fields, and unknown symbols all
//! collapse to it rather than aborting a query.

use crate::context::EvalContext;
use crate::dict::Dict;
use crate::scope::Scope;
use crate::stream::RowStream;
use serde::ser::{Serialize, Serializer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An unreduced expression carrying its binding scope. Reduction must be
/// idempotent within the lifetime of a single output row.
pub trait LazyValue: Send + Sync {
    fn reduce(&self, ctx: &EvalContext) -> Value;
}

/// An unexecuted SELECT. Each `eval` produces a fresh stream of rows against
/// the scope it is given.
pub trait StoredQuery: Send + Sync {
    fn eval(&self, ctx: &EvalContext, scope: &Scope) -> RowStream;
}

/// Arbitrary host data participating in protocols. Hosts downcast through
/// `as_any` inside their own protocol implementations.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// Handle to a lazy expression value.
#[derive(Clone)]
pub struct LazyExpr {
    inner: Arc<dyn LazyValue>,
}

impl LazyExpr {
    pub fn new(inner: Arc<dyn LazyValue>) -> Self {
        Self { inner }
    }

    pub fn reduce(&self, ctx: &EvalContext) -> Value {
        self.inner.reduce(ctx)
    }
}

/// A stored query together with the scope captured at binding time.
///
/// Evaluating through [`StoredQueryValue::eval`] uses the captured scope,
/// which is what variable references and subquery values want. Plugins such
/// as `foreach` that need to re-bind per-row variables go through
/// [`StoredQueryValue::eval_with`] instead.
#[derive(Clone)]
pub struct StoredQueryValue {
    query: Arc<dyn StoredQuery>,
    scope: Scope,
}

impl StoredQueryValue {
    pub fn new(query: Arc<dyn StoredQuery>, scope: Scope) -> Self {
        Self { query, scope }
    }

    /// Stream rows against the captured scope.
    pub fn eval(&self, ctx: &EvalContext) -> RowStream {
        self.query.eval(ctx, &self.scope)
    }

    /// Stream rows against a caller-supplied scope.
    pub fn eval_with(&self, ctx: &EvalContext, scope: &Scope) -> RowStream {
        self.query.eval(ctx, scope)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Handle to opaque host data.
#[derive(Clone)]
pub struct OpaqueValue {
    inner: Arc<dyn HostObject>,
}

impl OpaqueValue {
    pub fn new<T: HostObject + 'static>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }
}

/// The tagged runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Dict(Dict),
    Lazy(LazyExpr),
    Query(StoredQueryValue),
    Opaque(OpaqueValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers widen to float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Lazy(_) => "lazy",
            Value::Query(_) => "query",
            Value::Opaque(o) => o.type_name(),
        }
    }
}

// Structural equality for the built-in tags. Integers and floats compare
// numerically; lazy, query, and opaque values only compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Value::Dict(d) => f.debug_tuple("Dict").field(d).finish(),
            Value::Lazy(_) => write!(f, "Lazy(..)"),
            Value::Query(_) => write!(f, "Query(..)"),
            Value::Opaque(o) => write!(f, "Opaque({})", o.type_name()),
        }
    }
}

// Unreduced and opaque values serialize as null; callers materialize first.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(v) => v.serialize(serializer),
            Value::Dict(d) => d.serialize(serializer),
            Value::Lazy(_) | Value::Query(_) | Value::Opaque(_) => serializer.serialize_unit(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

// A host Option maps its None onto Null before it enters user space.
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}
