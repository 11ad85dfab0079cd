//! Runtime limits and policies for a scope tree

use serde::Deserialize;
use std::time::Duration;

/// Tunables shared by every scope in a tree.
///
/// A host builds these once and hands them to [`crate::Scope::with_options`];
/// every child scope inherits the same set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeOptions {
    /// Ceiling on recursive expression reduction. Exceeding it yields Null.
    pub max_stack_depth: usize,

    /// Capacity of the bounded channels that carry rows between pipeline
    /// stages. A slow consumer back-pressures its producer through this.
    pub channel_capacity: usize,

    /// Soft per-destructor deadline at scope close. The destructor keeps
    /// running past it; the close caller just stops waiting.
    pub destructor_timeout_secs: u64,

    /// When set, a panicking plugin or function aborts the query instead of
    /// being logged and collapsed to Null.
    pub strict_errors: bool,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            max_stack_depth: 1000,
            channel_capacity: 16,
            destructor_timeout_secs: 60,
            strict_errors: false,
        }
    }
}

impl ScopeOptions {
    pub fn destructor_timeout(&self) -> Duration {
        Duration::from_secs(self.destructor_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ScopeOptions::default();
        assert_eq!(opts.max_stack_depth, 1000);
        assert_eq!(opts.channel_capacity, 16);
        assert_eq!(opts.destructor_timeout(), Duration::from_secs(60));
        assert!(!opts.strict_errors);
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: ScopeOptions = serde_json::from_str(r#"{"max_stack_depth": 5}"#).unwrap();
        assert_eq!(opts.max_stack_depth, 5);
        assert_eq!(opts.channel_capacity, 16);
    }
}
