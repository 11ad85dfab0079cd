//! VFilter Core Library
//!
//! This crate provides the value model, scope, and protocol dispatch layer
//! of the VQL runtime.
//!
//! # Overview
//!
//! VQL is an embeddable query language whose surface resembles SQL but whose
//! evaluation model is a lazy, streaming, extensible pipeline. A host embeds
//! the runtime, registers plugins (row sources) and functions (scalar
//! operators), optionally pre-populates a scope with named values, then
//! parses and evaluates query text. Everything the language does to a value
//! resolves through per-operation protocol dispatchers the host can extend.
//!
//! # Modules
//!
//! - `value` - The tagged runtime value and the Null contracts
//! - `dict` - Insertion-ordered dictionaries (the row type)
//! - `scope` - Variable frames, registries, destructors, scope tree
//! - `protocols` - The eleven extensible operations and their dispatchers
//! - `stream` - Bounded-channel row streams
//! - `context` - Cancellation tokens
//! - `plugin` - Host extension traits
//! - `options` - Runtime limits and policies
//! - `error` - Error types and result alias

pub mod context;
pub mod dict;
pub mod error;
pub mod options;
pub mod plugin;
pub mod protocols;
pub mod scope;
pub mod stream;
pub mod value;

pub use context::EvalContext;
pub use dict::Dict;
pub use error::{Error, Result};
pub use options::ScopeOptions;
pub use plugin::{ArgDesc, FunctionInfo, GenericListPlugin, Plugin, PluginInfo, VqlFunction};
pub use protocols::ProtocolImpl;
pub use scope::{AggContext, Scope};
pub use stream::{RowSender, RowStream};
pub use value::{
    HostObject, LazyExpr, LazyValue, OpaqueValue, StoredQuery, StoredQueryValue, Value,
};
