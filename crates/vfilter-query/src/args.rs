//! Argument extraction for plugins and functions
//!
//! Call arguments arrive as a dict of unreduced values. [`ArgMap`] reduces a
//! value the moment it is asked for, coerces between integers and floats,
//! and traces type-incompatible assignments. Unknown arguments are ignored;
//! a missing required argument makes the call collapse to Null (functions)
//! or an empty stream (plugins), which the `required_*` accessors signal by
//! returning None after a trace.

use crate::eval::reduce;
use vfilter_core::{Dict, EvalContext, Scope, Value};

/// View over a call's actual arguments.
pub struct ArgMap<'a> {
    ctx: &'a EvalContext,
    scope: &'a Scope,
    args: &'a Dict,
}

impl<'a> ArgMap<'a> {
    pub fn new(ctx: &'a EvalContext, scope: &'a Scope, args: &'a Dict) -> Self {
        Self { ctx, scope, args }
    }

    pub fn present(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// The argument without reducing it. For lazily-consumed branches.
    pub fn raw(&self, name: &str) -> Option<Value> {
        self.args.get(name).cloned()
    }

    /// The argument with lazy wrappers peeled off.
    pub fn reduced(&self, name: &str) -> Option<Value> {
        self.args.get(name).map(|v| reduce(self.ctx, v.clone()))
    }

    /// The argument deep-reduced: stored queries drain into sequences.
    pub fn materialized(&self, name: &str) -> Option<Value> {
        self.reduced(name).map(|v| self.scope.materialize(self.ctx, &v))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.reduced(name)? {
            Value::Int(i) => Some(i),
            Value::Float(f) => Some(f as i64),
            other => {
                self.mismatch(name, "int", &other);
                None
            }
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.reduced(name)? {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            other => {
                self.mismatch(name, "float", &other);
                None
            }
        }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        match self.reduced(name)? {
            Value::String(s) => Some(s),
            other => {
                self.mismatch(name, "string", &other);
                None
            }
        }
    }

    pub fn required_int(&self, name: &str) -> Option<i64> {
        self.require(name)?;
        self.int(name)
    }

    pub fn required_float(&self, name: &str) -> Option<f64> {
        self.require(name)?;
        self.float(name)
    }

    pub fn required_string(&self, name: &str) -> Option<String> {
        self.require(name)?;
        self.string(name)
    }

    pub fn required_reduced(&self, name: &str) -> Option<Value> {
        self.require(name)?;
        self.reduced(name)
    }

    fn require(&self, name: &str) -> Option<()> {
        if self.present(name) {
            Some(())
        } else {
            self.scope.trace(&format!("required argument {name} is missing"));
            None
        }
    }

    fn mismatch(&self, name: &str, expected: &str, got: &Value) {
        self.scope.trace(&format!(
            "argument {name}: expected {expected}, got {}",
            got.type_name()
        ));
    }
}

/// Typed argument structs implement this by hand, pulling each declared
/// field out of the map.
pub trait FromArgs: Sized {
    fn from_args(args: &ArgMap<'_>) -> Option<Self>;
}
