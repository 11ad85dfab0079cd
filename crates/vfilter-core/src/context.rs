//! Cancellation contexts
//!
//! An [`EvalContext`] is threaded through every evaluation, iteration, and
//! host callback. Cancelling a context is visible to all of its descendants
//! but never to its parent, so a LIMIT can shut down its own source without
//! disturbing sibling pipelines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct CtxNode {
    cancelled: AtomicBool,
    parent: Option<Arc<CtxNode>>,
}

/// A cancellation token forming a tree.
#[derive(Clone)]
pub struct EvalContext {
    node: Arc<CtxNode>,
}

impl EvalContext {
    /// A fresh root context.
    pub fn new() -> Self {
        Self {
            node: Arc::new(CtxNode {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// A child context. Cancelling the child leaves the parent running;
    /// cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self {
            node: Arc::new(CtxNode {
                cancelled: AtomicBool::new(false),
                parent: Some(self.node.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut cur = Some(&self.node);
        while let Some(node) = cur {
            if node.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            cur = node.parent.as_ref();
        }
        false
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
