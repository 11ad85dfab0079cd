//! Row streams
//!
//! Every plugin runs on its own thread and publishes rows into a bounded
//! channel; the consumer half is a [`RowStream`]. Bounded capacity means a
//! slow consumer back-pressures its producer. A producer observes shutdown
//! either through its [`EvalContext`] or through the consumer dropping the
//! stream, whichever comes first.

use crate::context::EvalContext;
use crate::dict::Dict;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

/// Consumer half of a row pipeline. Iterating pulls rows in FIFO order until
/// the producer closes its end.
pub struct RowStream {
    rx: Receiver<Dict>,
}

/// Producer half of a row pipeline.
#[derive(Clone)]
pub struct RowSender {
    tx: Sender<Dict>,
    ctx: EvalContext,
}

impl RowSender {
    /// Send one row. Returns false when the pipeline is shut down (context
    /// cancelled or consumer gone); producers should stop promptly.
    pub fn send(&self, row: Dict) -> bool {
        let mut row = row;
        loop {
            if self.ctx.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(row, Duration::from_millis(100)) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(r)) => row = r,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}

impl RowStream {
    /// A stream that is already at end-of-stream.
    pub fn empty() -> Self {
        let (_tx, rx) = bounded(1);
        Self { rx }
    }

    /// A stream yielding exactly one row.
    pub fn single(row: Dict) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(row);
        Self { rx }
    }

    /// A connected sender/stream pair.
    pub fn channel(capacity: usize, ctx: &EvalContext) -> (RowSender, RowStream) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            RowSender {
                tx,
                ctx: ctx.clone(),
            },
            RowStream { rx },
        )
    }

    /// Spawn a producer thread. A panic inside the producer closes the stream
    /// and is logged; it never crosses the channel.
    pub fn spawn<F>(ctx: &EvalContext, capacity: usize, f: F) -> RowStream
    where
        F: FnOnce(RowSender) + Send + 'static,
    {
        let (sender, stream) = Self::channel(capacity, ctx);
        let spawned = thread::Builder::new()
            .name("vql-rows".to_string())
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(|| f(sender))).is_err() {
                    tracing::warn!(target: "vql", "row producer panicked; stream closed early");
                }
            });
        if spawned.is_err() {
            tracing::warn!(target: "vql", "failed to spawn row producer thread");
        }
        stream
    }

    /// A stream over an already-built row list.
    pub fn from_rows(ctx: &EvalContext, capacity: usize, rows: Vec<Dict>) -> RowStream {
        Self::spawn(ctx, capacity, move |sender| {
            for row in rows {
                if !sender.send(row) {
                    break;
                }
            }
        })
    }
}

impl Iterator for RowStream {
    type Item = Dict;

    fn next(&mut self) -> Option<Dict> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_empty_stream() {
        let mut s = RowStream::empty();
        assert!(s.next().is_none());
    }

    #[test]
    fn test_single_row() {
        let rows: Vec<Dict> = RowStream::single(Dict::new().with("a", 1)).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_fifo_order() {
        let ctx = EvalContext::new();
        let rows: Vec<Dict> = (0..20).map(|i| Dict::new().with("i", i as i64)).collect();
        let collected: Vec<Dict> = RowStream::from_rows(&ctx, 4, rows.clone()).collect();
        assert_eq!(collected, rows);
    }

    #[test]
    fn test_cancel_stops_producer() {
        let ctx = EvalContext::new();
        // Capacity 1 so the producer blocks quickly on an unread stream.
        let stream = RowStream::spawn(&ctx, 1, |sender| {
            let mut i = 0i64;
            loop {
                if !sender.send(Dict::new().with("i", i)) {
                    break;
                }
                i += 1;
            }
        });
        ctx.cancel();
        // The producer observes the cancel within its send loop; draining
        // whatever was buffered terminates.
        let drained: Vec<Dict> = stream.collect();
        assert!(drained.len() <= 2);
    }

    #[test]
    fn test_dropped_consumer_disconnects_producer() {
        let ctx = EvalContext::new();
        let (done_tx, done_rx) = bounded(1);
        let stream = RowStream::spawn(&ctx, 1, move |sender| {
            let mut i = 0i64;
            while sender.send(Dict::new().with("i", i)) {
                i += 1;
            }
            let _ = done_tx.send(());
        });
        drop(stream);
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_producer_panic_closes_stream() {
        let ctx = EvalContext::new();
        let mut stream = RowStream::spawn(&ctx, 4, |sender| {
            sender.send(Dict::new().with("ok", true));
            panic!("boom");
        });
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
    }
}
