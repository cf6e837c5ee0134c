//! Execution disciplines.
//!
//! Each discipline turns a dispatch into a delayed execution on the tokio
//! runtime. They share a [`DispatchContext`] holding the registry, metrics,
//! runtime handle and limit configuration.

pub mod deferred;
pub mod immediate;
pub mod queue;

use crate::application::error::DispatchError;
use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use crate::application::registry::{CallRegistry, KeyState};
use crate::application::reporter::{HeaderReporter, HintSink};
use crate::domain::headers::Headers;
use crate::domain::limit::{CancellationScope, Limit};
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// State shared by every discipline of one limiter.
#[derive(Clone)]
pub struct DispatchContext<S>
where
    S: Storage<String, KeyState> + Clone,
{
    registry: CallRegistry<S>,
    metrics: Metrics,
    runtime: Handle,
    limit: Limit,
    scope: CancellationScope,
    ids: Arc<AtomicU64>,
}

impl<S> DispatchContext<S>
where
    S: Storage<String, KeyState> + Clone + 'static,
{
    /// Create a context.
    ///
    /// # Arguments
    /// * `registry` - Per-key state (which contains the clock and hint parser)
    /// * `metrics` - Metrics tracker
    /// * `runtime` - Runtime the delayed executions are spawned on
    /// * `limit` - Maximum delay (immediate, deferred) or queue capacity (queue)
    /// * `scope` - Which timers a limit failure cancels
    pub fn new(
        registry: CallRegistry<S>,
        metrics: Metrics,
        runtime: Handle,
        limit: Limit,
        scope: CancellationScope,
    ) -> Self {
        Self {
            registry,
            metrics,
            runtime,
            limit,
            scope,
            ids: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the registry.
    pub fn registry(&self) -> &CallRegistry<S> {
        &self.registry
    }

    /// Get the metrics tracker.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the runtime handle.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Get the configured limit.
    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Get the cancellation scope.
    pub fn scope(&self) -> CancellationScope {
        self.scope
    }

    /// Hand out an id unique within this limiter.
    pub(crate) fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Build a reporter bound to `key`.
    pub fn reporter(&self, key: &str) -> HeaderReporter {
        HeaderReporter::new(key, Arc::new(self.clone()))
    }

    /// Check the key's pending delay against the maximum delay.
    ///
    /// Registers the key. On success returns how long the execution must wait.
    /// On failure cancels pending timers according to the scope.
    pub(crate) fn check_delay(&self, key: &str) -> Result<Duration, DispatchError> {
        let (delay_ms, wait) = self
            .registry
            .with_state(key, |state, now| (state.call.delay_ms(now), state.call.wait(now)));

        if self.limit.allows_delay(delay_ms) {
            return Ok(wait);
        }

        let cancelled = self.cancel_for_limit(key);
        self.metrics.record_limit_exceeded();
        warn!(
            key,
            delay_ms,
            limit = %self.limit,
            cancelled,
            "call limit exceeded"
        );
        Err(DispatchError::limit_exceeded(key, delay_ms, self.limit))
    }

    /// Run `task` on the runtime after `wait`, tracked as a pending timer of `key`.
    ///
    /// The timer is spawned and tracked under the key's lock, so it cannot
    /// fire before it is tracked.
    pub(crate) fn schedule<F>(&self, key: &str, wait: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id();
        let registry = self.registry.clone();
        let owned_key = key.to_string();

        self.registry.with_state(key, |state, _| {
            let handle = self.runtime.spawn(async move {
                tokio::time::sleep(wait).await;
                registry.with_existing_mut(&owned_key, |state, _| state.timers.complete(id));
                task();
            });
            state.timers.track(id, handle.abort_handle());
        });

        self.metrics.record_dispatched();
        debug!(key, wait_ms = wait.as_millis() as u64, "call scheduled");
    }

    /// Cancel the timers a limit failure on `key` invalidates.
    fn cancel_for_limit(&self, key: &str) -> usize {
        match self.scope {
            CancellationScope::Key => self.cancel_key(key),
            CancellationScope::Instance => self.cancel_all(),
        }
    }

    /// Cancel the pending timers of one key.
    pub fn cancel_key(&self, key: &str) -> usize {
        let cancelled = self
            .registry
            .with_existing_mut(key, |state, _| state.timers.cancel_all())
            .unwrap_or(0);
        self.metrics.record_cancelled(cancelled);
        cancelled
    }

    /// Cancel the pending timers of every key.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.registry
            .for_each_mut(|_, state| cancelled += state.timers.cancel_all());
        self.metrics.record_cancelled(cancelled);
        cancelled
    }
}

impl<S> HintSink for DispatchContext<S>
where
    S: Storage<String, KeyState> + Clone + 'static,
{
    fn report(&self, key: &str, headers: &Headers) -> Option<Instant> {
        let raised = self.registry.report_headers(key, headers)?;
        self.metrics.record_hint_applied();
        debug!(
            key,
            wait_ms = raised
                .saturating_duration_since(self.registry.now())
                .as_millis() as u64,
            "not-before raised"
        );
        Some(raised)
    }
}

/// Run a user action, containing any panic.
///
/// Returns true if the action completed.
pub(crate) fn run_guarded<F>(metrics: &Metrics, key: &str, action: F) -> bool
where
    F: FnOnce(),
{
    match panic::catch_unwind(panic::AssertUnwindSafe(action)) {
        Ok(()) => {
            metrics.record_executed();
            true
        }
        Err(_) => {
            metrics.record_panic();
            error!(key, "action panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hint::HintParser;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;

    type TestStorage = Arc<ShardedStorage<String, KeyState>>;

    fn context(limit: Limit, scope: CancellationScope) -> (DispatchContext<TestStorage>, MockClock) {
        let clock = MockClock::new(Instant::now());
        let registry = CallRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(clock.clone()),
            HintParser::new(),
        );
        let ctx = DispatchContext::new(registry, Metrics::new(), Handle::current(), limit, scope);
        (ctx, clock)
    }

    fn retry_after(secs: u64) -> Headers {
        Headers::new().with("Retry-After", secs)
    }

    #[tokio::test]
    async fn test_check_delay_within_limit() {
        let (ctx, _clock) = context(Limit::Max(5_000), CancellationScope::Key);
        ctx.report("k", &retry_after(2));

        let wait = ctx.check_delay("k").unwrap();
        assert_eq!(wait, Duration::from_secs(2));
        assert_eq!(ctx.metrics().hints_applied(), 1);
    }

    #[tokio::test]
    async fn test_check_delay_exceeded() {
        let (ctx, _clock) = context(Limit::Max(100), CancellationScope::Key);
        ctx.report("k", &retry_after(1));

        let err = ctx.check_delay("k").unwrap_err();
        assert_eq!(
            err,
            DispatchError::LimitExceeded {
                key: "k".to_string(),
                delay_ms: 1000,
                limit_ms: 100,
            }
        );
        assert_eq!(ctx.metrics().limit_exceeded(), 1);
    }

    #[tokio::test]
    async fn test_disabled_limit_accepts_any_delay() {
        let (ctx, _clock) = context(Limit::Disabled, CancellationScope::Key);
        ctx.report("k", &retry_after(86_400));

        assert_eq!(ctx.check_delay("k").unwrap(), Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_cancel_scope_key_spares_other_keys() {
        let (ctx, _clock) = context(Limit::Max(100), CancellationScope::Key);
        ctx.schedule("a", Duration::from_secs(60), || {});
        ctx.schedule("b", Duration::from_secs(60), || {});

        ctx.report("a", &retry_after(10));
        assert!(ctx.check_delay("a").is_err());

        let pending = |key: &str| {
            ctx.registry()
                .with_existing(key, |state, _| state.timers.len())
                .unwrap()
        };
        assert_eq!(pending("a"), 0);
        assert_eq!(pending("b"), 1);
        assert_eq!(ctx.metrics().timers_cancelled(), 1);
    }

    #[tokio::test]
    async fn test_cancel_scope_instance_clears_everything() {
        let (ctx, _clock) = context(Limit::Max(100), CancellationScope::Instance);
        ctx.schedule("a", Duration::from_secs(60), || {});
        ctx.schedule("b", Duration::from_secs(60), || {});

        ctx.report("a", &retry_after(10));
        assert!(ctx.check_delay("a").is_err());

        assert_eq!(ctx.metrics().timers_cancelled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_untracks_fired_timer() {
        let (ctx, _clock) = context(Limit::Disabled, CancellationScope::Key);
        let (tx, rx) = tokio::sync::oneshot::channel();
        ctx.schedule("k", Duration::from_millis(50), move || {
            let _ = tx.send(());
        });

        rx.await.unwrap();
        let pending = ctx
            .registry()
            .with_existing("k", |state, _| state.timers.len());
        assert_eq!(pending, Some(0));
        assert_eq!(ctx.metrics().calls_dispatched(), 1);
    }

    #[test]
    fn test_run_guarded_contains_panic() {
        let metrics = Metrics::new();

        assert!(run_guarded(&metrics, "k", || {}));
        assert!(!run_guarded(&metrics, "k", || panic!("boom")));

        assert_eq!(metrics.calls_executed(), 1);
        assert_eq!(metrics.actions_panicked(), 1);
    }
}
