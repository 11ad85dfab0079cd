//! VFilter Query Engine
//!
//! Provides VQL parsing and streaming evaluation on top of `vfilter-core`.
//!
//! # Overview
//!
//! The query engine implements:
//! - A logos lexer and hand-written recursive descent parser
//! - An AST with canonical rendering (re-parsing a rendered AST yields the
//!   same AST)
//! - A lazy, streaming SELECT evaluator with WHERE, GROUP BY, ORDER BY, and
//!   LIMIT stages
//! - LET bindings, lazy and materialized, including parameterized callables
//! - The built-in plugin and function set

pub mod aggregates;
pub mod args;
pub mod ast;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod plugins;

pub use args::{ArgMap, FromArgs};
pub use ast::{
    Arg, BinOp, Column, Columns, Expr, FnCall, Let, LetBody, Literal, OrderBy, Select, VQL,
};
pub use eval::{eval_expr, eval_let, eval_select, eval_to_rows, reduce};
pub use lexer::{tokenize, Token};
pub use parser::{parse, parse_multi};

use vfilter_core::{Scope, ScopeOptions};

/// A root scope with the built-in functions, aggregates, and plugins
/// registered. Hosts append their own plugins, functions, protocol
/// implementations, and variables on top.
pub fn new_scope() -> Scope {
    new_scope_with_options(ScopeOptions::default())
}

pub fn new_scope_with_options(options: ScopeOptions) -> Scope {
    let scope = Scope::with_options(options);
    scope.append_functions(functions::builtin_functions());
    scope.append_functions(aggregates::builtin_aggregates());
    scope.append_plugins(plugins::builtin_plugins());
    scope
}
