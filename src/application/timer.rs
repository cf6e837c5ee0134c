//! Bookkeeping for delayed executions.
//!
//! Every scheduled action is a tokio task that sleeps until the key's
//! deadline. The abort handles are kept per key so a limit failure, a reset or
//! a shutdown can cancel whatever has not fired yet.

use std::collections::HashMap;
use tokio::task::AbortHandle;

/// Abort handles of the timers still pending for one call-key.
#[derive(Debug, Default)]
pub struct PendingTimers {
    handles: HashMap<u64, AbortHandle>,
}

impl PendingTimers {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a timer.
    pub fn track(&mut self, id: u64, handle: AbortHandle) {
        self.handles.insert(id, handle);
    }

    /// Stop tracking a timer that fired. Returns false if it was already cancelled.
    pub fn complete(&mut self, id: u64) -> bool {
        self.handles.remove(&id).is_some()
    }

    /// Abort every tracked timer and return how many were aborted.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.handles.len();
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
        count
    }

    /// Number of timers still pending.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
