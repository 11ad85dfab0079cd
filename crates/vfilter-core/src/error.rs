//! Error types for the VQL runtime
//!
//! Parse errors are the only hard failures surfaced to the host; evaluation
//! faults collapse to Null inside the engine.

use thiserror::Error;

/// The main error type for VQL operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for VQL operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a parse error anchored at a line/column pair.
    pub fn parse<S: Into<String>>(message: S, line: usize, column: usize) -> Self {
        Error::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    /// Returns true if this error came out of the parser
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}
