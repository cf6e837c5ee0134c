//! Limiter coordination logic.
//!
//! The limiter routes dispatches to the configured discipline, exposes the
//! header-report entry point and the per-key inspection queries, and owns the
//! lifecycle operations (cancel, reset, shutdown).

use crate::application::dispatch::deferred::{Deferred, DeferredDispatcher, Resolver};
use crate::application::dispatch::immediate::ImmediateDispatcher;
use crate::application::dispatch::queue::QueueDispatcher;
use crate::application::dispatch::DispatchContext;
use crate::application::error::DispatchError;
use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use crate::application::registry::{CallRegistry, KeyState};
use crate::application::reporter::{HeaderReporter, HintSink};
use crate::domain::headers::Headers;
use crate::domain::limit::{CancellationScope, Discipline, Limit};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Clone)]
enum Dispatcher<S>
where
    S: Storage<String, KeyState> + Clone,
{
    Immediate(ImmediateDispatcher<S>),
    Queue(QueueDispatcher<S>),
    Deferred(DeferredDispatcher<S>),
}

/// Coordinates call scheduling for any number of call-keys.
///
/// Clones share all state: registry, timers, queues and metrics.
#[derive(Clone)]
pub struct LimiterCore<S>
where
    S: Storage<String, KeyState> + Clone,
{
    ctx: DispatchContext<S>,
    dispatcher: Dispatcher<S>,
    discipline: Discipline,
}

impl<S> LimiterCore<S>
where
    S: Storage<String, KeyState> + Clone + 'static,
{
    /// Create a limiter.
    ///
    /// # Arguments
    /// * `ctx` - Shared dispatch context (registry, metrics, runtime, limit)
    /// * `discipline` - How accepted calls are executed
    pub fn from_context(ctx: DispatchContext<S>, discipline: Discipline) -> Self {
        let dispatcher = match discipline {
            Discipline::Immediate => Dispatcher::Immediate(ImmediateDispatcher::new(ctx.clone())),
            Discipline::Queue => Dispatcher::Queue(QueueDispatcher::new(ctx.clone())),
            Discipline::Deferred => Dispatcher::Deferred(DeferredDispatcher::new(ctx.clone())),
        };
        Self {
            ctx,
            dispatcher,
            discipline,
        }
    }

    /// Dispatch `action` for `key` (immediate and queue disciplines).
    ///
    /// The action receives a [`HeaderReporter`] bound to `key`. Headers it
    /// reports before returning are applied before the key's next call is
    /// scheduled.
    ///
    /// `on_drained` runs after the action (immediate), or once the key's queue
    /// has emptied with this item (queue).
    ///
    /// # Errors
    /// * `LimitExceeded` - the key's deadline is beyond the maximum delay
    /// * `QueueFull` - the key's queue is at capacity
    /// * `WrongDiscipline` - the limiter uses the deferred discipline
    pub fn dispatch<A, D>(&self, key: &str, action: A, on_drained: D) -> Result<(), DispatchError>
    where
        A: FnOnce(&HeaderReporter) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        match &self.dispatcher {
            Dispatcher::Immediate(dispatcher) => {
                dispatcher.dispatch(key, Box::new(action), Box::new(on_drained))
            }
            Dispatcher::Queue(dispatcher) => {
                dispatcher.dispatch(key, Box::new(action), Box::new(on_drained))
            }
            Dispatcher::Deferred(_) => Err(self.wrong_discipline("dispatch")),
        }
    }

    /// Dispatch `action` without a drain callback.
    ///
    /// # Errors
    /// Same as [`dispatch`](Self::dispatch).
    pub fn dispatch_with<A>(&self, key: &str, action: A) -> Result<(), DispatchError>
    where
        A: FnOnce(&HeaderReporter) + Send + 'static,
    {
        self.dispatch(key, action, || {})
    }

    /// Dispatch `action` for `key` and get a future of its outcome (deferred
    /// discipline).
    ///
    /// Refusals (`LimitExceeded`, `WrongDiscipline`) resolve the future
    /// immediately without running the action.
    pub fn dispatch_deferred<T, E, F>(&self, key: &str, action: F) -> Deferred<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(Resolver<T, E>, HeaderReporter) + Send + 'static,
    {
        match &self.dispatcher {
            Dispatcher::Deferred(dispatcher) => dispatcher.dispatch(key, action),
            _ => Deferred::failed(self.wrong_discipline("dispatch_deferred")),
        }
    }

    /// Fold the hint carried by `headers` into `key`'s state.
    ///
    /// Usable outside any dispatched action, e.g. for responses obtained by
    /// other means.
    ///
    /// # Returns
    /// The key's new not-before instant if the hint made it stricter.
    pub fn report_headers(&self, key: &str, headers: &Headers) -> Option<Instant> {
        self.ctx.report(key, headers)
    }

    /// Instant before which no call for `key` starts, if the key is known.
    pub fn not_before(&self, key: &str) -> Option<Instant> {
        self.registry()
            .with_existing(key, |state, _| state.call.not_before())
    }

    /// Signed milliseconds until `key`'s not-before instant, if the key is known.
    ///
    /// Negative once the deadline has passed.
    pub fn delay_for(&self, key: &str) -> Option<i64> {
        self.registry()
            .with_existing(key, |state, now| state.call.delay_ms(now))
    }

    /// Number of calls waiting in `key`'s queue (not counting one being run).
    pub fn queue_len(&self, key: &str) -> usize {
        self.registry()
            .with_existing(key, |state, _| state.queue.len())
            .unwrap_or(0)
    }

    /// Check whether a worker is draining `key`'s queue.
    pub fn is_worker_active(&self, key: &str) -> bool {
        self.registry()
            .with_existing(key, |state, _| state.queue.is_worker_active())
            .unwrap_or(false)
    }

    /// Number of scheduled executions for `key` that have not fired yet.
    pub fn pending_timers(&self, key: &str) -> usize {
        self.registry()
            .with_existing(key, |state, _| state.timers.len())
            .unwrap_or(0)
    }

    /// All registered call-keys, in no particular order.
    pub fn tracked_keys(&self) -> Vec<String> {
        self.registry().keys()
    }

    /// Number of registered call-keys.
    pub fn key_count(&self) -> usize {
        self.registry().len()
    }

    /// Drop everything pending for `key`: its timers and its queued calls.
    ///
    /// The key's timing state is kept. Returns how many executions were dropped.
    pub fn cancel_pending(&self, key: &str) -> usize {
        let cancelled = self.ctx.cancel_key(key);
        let discarded = self
            .registry()
            .with_existing_mut(key, |state, _| state.queue.clear())
            .unwrap_or(0);
        debug!(key, cancelled, discarded, "pending calls dropped");
        cancelled + discarded
    }

    /// Forget `key` entirely, dropping its pending executions.
    ///
    /// Returns false if the key was unknown.
    pub fn reset(&self, key: &str) -> bool {
        let Some(mut state) = self.registry().remove(key) else {
            return false;
        };
        let cancelled = state.timers.cancel_all();
        let discarded = state.queue.clear();
        self.ctx.metrics().record_cancelled(cancelled);
        debug!(key, cancelled, discarded, "call-key reset");
        true
    }

    /// Drop every pending execution of every key.
    ///
    /// Keys and their timing state survive, so later dispatches still honor
    /// known hints. Returns how many executions were dropped.
    pub fn shutdown(&self) -> usize {
        let mut cancelled = 0;
        let mut discarded = 0;
        self.registry().for_each_mut(|_, state| {
            cancelled += state.timers.cancel_all();
            discarded += state.queue.clear();
        });
        self.ctx.metrics().record_cancelled(cancelled);
        info!(cancelled, discarded, "limiter shut down");
        cancelled + discarded
    }

    /// Get the configured discipline.
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Get the configured limit.
    pub fn limit(&self) -> Limit {
        self.ctx.limit()
    }

    /// Get the cancellation scope.
    pub fn cancellation_scope(&self) -> CancellationScope {
        self.ctx.scope()
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        self.ctx.metrics()
    }

    /// Get a reference to the registry.
    pub fn registry(&self) -> &CallRegistry<S> {
        self.ctx.registry()
    }

    fn wrong_discipline(&self, method: &'static str) -> DispatchError {
        DispatchError::WrongDiscipline {
            configured: self.discipline,
            method,
        }
    }
}
