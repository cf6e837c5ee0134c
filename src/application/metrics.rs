//! Observability metrics for the limiter.
//!
//! Provides counters about dispatch outcomes for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking limiter statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Dispatches accepted for scheduling
    calls_dispatched: AtomicU64,
    /// Actions that ran to completion
    calls_executed: AtomicU64,
    /// Dispatches refused because the delay exceeded the limit
    limit_exceeded: AtomicU64,
    /// Dispatches refused because the queue was full
    queue_full: AtomicU64,
    /// Pending timers aborted before firing
    timers_cancelled: AtomicU64,
    /// Actions that panicked
    actions_panicked: AtomicU64,
    /// Header reports that moved a key's not-before forward
    hints_applied: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_dispatched(&self) {
        self.inner.calls_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self) {
        self.inner.calls_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_limit_exceeded(&self) {
        self.inner.limit_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_full(&self) {
        self.inner.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self, count: usize) {
        self.inner
            .timers_cancelled
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.inner.actions_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hint_applied(&self) {
        self.inner.hints_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Dispatches accepted for scheduling.
    pub fn calls_dispatched(&self) -> u64 {
        self.inner.calls_dispatched.load(Ordering::Relaxed)
    }

    /// Actions that ran to completion.
    pub fn calls_executed(&self) -> u64 {
        self.inner.calls_executed.load(Ordering::Relaxed)
    }

    /// Dispatches refused with `LimitExceeded`.
    pub fn limit_exceeded(&self) -> u64 {
        self.inner.limit_exceeded.load(Ordering::Relaxed)
    }

    /// Dispatches refused with `QueueFull`.
    pub fn queue_full(&self) -> u64 {
        self.inner.queue_full.load(Ordering::Relaxed)
    }

    /// Pending timers aborted before firing.
    pub fn timers_cancelled(&self) -> u64 {
        self.inner.timers_cancelled.load(Ordering::Relaxed)
    }

    /// Actions that panicked.
    pub fn actions_panicked(&self) -> u64 {
        self.inner.actions_panicked.load(Ordering::Relaxed)
    }

    /// Header reports that moved a not-before instant forward.
    pub fn hints_applied(&self) -> u64 {
        self.inner.hints_applied.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_dispatched: self.calls_dispatched(),
            calls_executed: self.calls_executed(),
            limit_exceeded: self.limit_exceeded(),
            queue_full: self.queue_full(),
            timers_cancelled: self.timers_cancelled(),
            actions_panicked: self.actions_panicked(),
            hints_applied: self.hints_applied(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.calls_dispatched.store(0, Ordering::Relaxed);
        self.inner.calls_executed.store(0, Ordering::Relaxed);
        self.inner.limit_exceeded.store(0, Ordering::Relaxed);
        self.inner.queue_full.store(0, Ordering::Relaxed);
        self.inner.timers_cancelled.store(0, Ordering::Relaxed);
        self.inner.actions_panicked.store(0, Ordering::Relaxed);
        self.inner.hints_applied.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Dispatches accepted for scheduling
    pub calls_dispatched: u64,
    /// Actions that ran to completion
    pub calls_executed: u64,
    /// Dispatches refused with `LimitExceeded`
    pub limit_exceeded: u64,
    /// Dispatches refused with `QueueFull`
    pub queue_full: u64,
    /// Pending timers aborted before firing
    pub timers_cancelled: u64,
    /// Actions that panicked
    pub actions_panicked: u64,
    /// Header reports that moved a not-before instant forward
    pub hints_applied: u64,
}

impl MetricsSnapshot {
    /// Total dispatch attempts, accepted or refused.
    pub fn total_attempts(&self) -> u64 {
        self.calls_dispatched
            .saturating_add(self.limit_exceeded)
            .saturating_add(self.queue_full)
    }

    /// Fraction of dispatch attempts that were refused (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing was dispatched.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_attempts();
        if total == 0 {
            0.0
        } else {
            self.limit_exceeded.saturating_add(self.queue_full) as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record_dispatched();
        metrics.record_dispatched();
        metrics.record_executed();
        metrics.record_limit_exceeded();
        metrics.record_queue_full();
        metrics.record_cancelled(3);
        metrics.record_panic();
        metrics.record_hint_applied();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls_dispatched, 2);
        assert_eq!(snapshot.calls_executed, 1);
        assert_eq!(snapshot.limit_exceeded, 1);
        assert_eq!(snapshot.queue_full, 1);
        assert_eq!(snapshot.timers_cancelled, 3);
        assert_eq!(snapshot.actions_panicked, 1);
        assert_eq!(snapshot.hints_applied, 1);
        assert_eq!(snapshot.total_attempts(), 4);
        assert_eq!(snapshot.rejection_rate(), 0.5);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_dispatched();

        assert_eq!(metrics.calls_dispatched(), 1);

        metrics.reset();
        assert_eq!(clone.calls_dispatched(), 0);
    }

    #[test]
    fn test_rejection_rate_empty() {
        assert_eq!(MetricsSnapshot::default().rejection_rate(), 0.0);
    }
}
