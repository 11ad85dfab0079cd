//! Protocol dispatch
//!
//! Every operation the language performs on values (truth tests, equality,
//! ordering, arithmetic, membership, field access, regex match, iteration)
//! resolves through a dispatcher. A dispatcher inlines fast paths for the
//! common built-in tag combinations at its head, then walks an ordered list
//! of host-supplied implementations; the first whose `applicable` predicate
//! answers true wins. A miss falls back to the operation's neutral result
//! (false, Null, or an empty/singleton stream).
//!
//! Hosts extend an operation by handing the scope a [`ProtocolImpl`]; a child
//! scope copies each dispatcher list so its additions never leak upward.

mod arith;
mod associative;
mod boolean;
mod compare;
mod iterate;
mod membership;
mod regex;

pub use arith::{AddDispatcher, DivDispatcher, MulDispatcher, SubDispatcher};
pub use associative::AssociativeDispatcher;
pub use boolean::BoolDispatcher;
pub use compare::{EqDispatcher, LtDispatcher};
pub use iterate::IterateDispatcher;
pub use membership::MembershipDispatcher;
pub use regex::RegexDispatcher;

use crate::context::EvalContext;
use crate::scope::Scope;
use crate::stream::RowStream;
use crate::value::Value;
use std::sync::Arc;

/// Truth value of a single operand.
pub trait BoolProtocol: Send + Sync {
    fn applicable(&self, a: &Value) -> bool;
    fn as_bool(&self, ctx: &EvalContext, scope: &Scope, a: &Value) -> bool;
}

/// Equality of two operands.
pub trait EqProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn eq(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool;
}

/// Strict ordering: is `a` less than `b`?
pub trait LtProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn lt(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool;
}

pub trait AddProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn add(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value;
}

pub trait SubProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn sub(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value;
}

pub trait MulProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn mul(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value;
}

pub trait DivProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn div(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> Value;
}

/// The `in` operator: is `a` a member of `b`?
pub trait MembershipProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn contains(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value) -> bool;
}

/// Field access (`a.b`) and indexing (`a[b]`).
pub trait AssociativeProtocol: Send + Sync {
    fn applicable(&self, a: &Value, b: &Value) -> bool;
    fn associative(&self, ctx: &EvalContext, scope: &Scope, a: &Value, b: &Value)
        -> Option<Value>;

    /// Whether this implementation can enumerate members of `a`.
    fn members_applicable(&self, _a: &Value) -> bool {
        false
    }

    fn get_members(&self, _scope: &Scope, _a: &Value) -> Vec<String> {
        Vec::new()
    }
}

/// The `=~` operator: does `pattern` match `target`?
pub trait RegexProtocol: Send + Sync {
    fn applicable(&self, pattern: &Value, target: &Value) -> bool;
    fn matches(&self, ctx: &EvalContext, scope: &Scope, pattern: &Value, target: &Value) -> bool;
}

/// Turning a value into a stream of rows.
pub trait IterateProtocol: Send + Sync {
    fn applicable(&self, a: &Value) -> bool;
    fn iterate(&self, ctx: &EvalContext, scope: &Scope, a: &Value) -> RowStream;
}

/// A host-supplied implementation, tagged by the protocol it extends.
///
/// Routing is exhaustive by construction: a value that implements none of the
/// protocols cannot be wrapped in this enum at all.
#[derive(Clone)]
pub enum ProtocolImpl {
    Bool(Arc<dyn BoolProtocol>),
    Eq(Arc<dyn EqProtocol>),
    Lt(Arc<dyn LtProtocol>),
    Add(Arc<dyn AddProtocol>),
    Sub(Arc<dyn SubProtocol>),
    Mul(Arc<dyn MulProtocol>),
    Div(Arc<dyn DivProtocol>),
    Membership(Arc<dyn MembershipProtocol>),
    Associative(Arc<dyn AssociativeProtocol>),
    Regex(Arc<dyn RegexProtocol>),
    Iterate(Arc<dyn IterateProtocol>),
}

/// The per-scope set of dispatchers. `Clone` duplicates every implementation
/// list, which is what gives child scopes independent extension points.
#[derive(Clone, Default)]
pub struct Dispatchers {
    pub boolean: BoolDispatcher,
    pub eq: EqDispatcher,
    pub lt: LtDispatcher,
    pub add: AddDispatcher,
    pub sub: SubDispatcher,
    pub mul: MulDispatcher,
    pub div: DivDispatcher,
    pub membership: MembershipDispatcher,
    pub associative: AssociativeDispatcher,
    pub regex: RegexDispatcher,
    pub iterate: IterateDispatcher,
}

impl Dispatchers {
    pub fn add_impl(&mut self, imp: ProtocolImpl) {
        match imp {
            ProtocolImpl::Bool(i) => self.boolean.add_impl(i),
            ProtocolImpl::Eq(i) => self.eq.add_impl(i),
            ProtocolImpl::Lt(i) => self.lt.add_impl(i),
            ProtocolImpl::Add(i) => self.add.add_impl(i),
            ProtocolImpl::Sub(i) => self.sub.add_impl(i),
            ProtocolImpl::Mul(i) => self.mul.add_impl(i),
            ProtocolImpl::Div(i) => self.div.add_impl(i),
            ProtocolImpl::Membership(i) => self.membership.add_impl(i),
            ProtocolImpl::Associative(i) => self.associative.add_impl(i),
            ProtocolImpl::Regex(i) => self.regex.add_impl(i),
            ProtocolImpl::Iterate(i) => self.iterate.add_impl(i),
        }
    }
}

/// Numeric view shared by the comparison dispatchers: booleans order as 1/0.
pub(crate) fn numeric_or_bool(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        _ => None,
    }
}
