//! Construction of ready-to-use limiters.
//!
//! Wires the default adapters (system clock, sharded storage, the current
//! tokio runtime) into a [`LimiterCore`].

use crate::application::dispatch::DispatchContext;
use crate::application::limiter::LimiterCore;
use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::application::registry::{CallRegistry, KeyState};
use crate::domain::hint::HintParser;
use crate::domain::limit::{CancellationScope, Discipline, Limit, LimitError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Storage backing limiters built by [`CallLimiterBuilder`].
pub type DefaultStorage = Arc<ShardedStorage<String, KeyState>>;

/// Limiter over the default storage.
pub type CallLimiter = LimiterCore<DefaultStorage>;

/// Error returned when building a limiter fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// No runtime was given and the builder was not called from within one
    #[error("no tokio runtime: build inside a runtime or call `with_runtime`")]
    NoRuntime,
    /// The hint parser would never find a hint
    #[error("no hint header configured: give at least one Retry-After alias or enable reset headers")]
    NoHintHeaders,
    /// The raw limit value is invalid
    #[error(transparent)]
    Limit(#[from] LimitError),
}

/// Builder for constructing a [`CallLimiter`].
///
/// # Example
/// ```no_run
/// use call_governor::{CallLimiter, CancellationScope, Discipline, Limit};
///
/// # async fn demo() {
/// let limiter = CallLimiter::builder()
///     .with_discipline(Discipline::Queue)
///     .with_limit(Limit::Max(100))
///     .with_cancellation_scope(CancellationScope::Key)
///     .build()
///     .unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct CallLimiterBuilder {
    discipline: Discipline,
    limit: Result<Limit, LimitError>,
    scope: CancellationScope,
    parser: HintParser,
    clock: Option<Arc<dyn Clock>>,
    runtime: Option<Handle>,
}

impl CallLimiterBuilder {
    /// Set the execution discipline (default: immediate).
    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Set the limit (default: disabled).
    ///
    /// Maximum delay in milliseconds for the immediate and deferred
    /// disciplines, queue capacity for the queue discipline.
    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Ok(limit);
        self
    }

    /// Set the limit from its raw integer form, where `-1` disables it.
    ///
    /// Other negative values make [`build`](Self::build) fail.
    pub fn with_raw_limit(mut self, raw: i64) -> Self {
        self.limit = Limit::try_from(raw);
        self
    }

    /// Set which timers a `LimitExceeded` failure cancels (default: the
    /// failing key's).
    pub fn with_cancellation_scope(mut self, scope: CancellationScope) -> Self {
        self.scope = scope;
        self
    }

    /// Replace the header names read as Retry-After (default: `retry-after`).
    ///
    /// Names are matched case-insensitively, in the given order.
    pub fn with_retry_after_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parser = self.parser.with_retry_after_aliases(aliases);
        self
    }

    /// Also honor `x-rate-limit-remaining` / `x-rate-limit-reset` (default: off).
    pub fn with_reset_headers(mut self, enabled: bool) -> Self {
        self.parser = self.parser.with_reset_headers(enabled);
        self
    }

    /// Set a custom clock (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Spawn executions on this runtime instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid or no runtime is
    /// available.
    pub fn build(self) -> Result<CallLimiter, BuildError> {
        let limit = self.limit?;
        if self.parser.is_inert() {
            return Err(BuildError::NoHintHeaders);
        }
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let storage: DefaultStorage = Arc::new(ShardedStorage::new());
        let registry = CallRegistry::new(storage, clock, self.parser);
        let ctx = DispatchContext::new(registry, Metrics::new(), runtime, limit, self.scope);

        debug!(
            discipline = %self.discipline,
            limit = %limit,
            scope = ?self.scope,
            "call limiter built"
        );
        Ok(LimiterCore::from_context(ctx, self.discipline))
    }
}

impl CallLimiter {
    /// Create a builder for configuring the limiter.
    pub fn builder() -> CallLimiterBuilder {
        CallLimiterBuilder {
            discipline: Discipline::default(),
            limit: Ok(Limit::default()),
            scope: CancellationScope::default(),
            parser: HintParser::new(),
            clock: None,
            runtime: None,
        }
    }

    /// Create a limiter with default hint headers on the current runtime.
    ///
    /// # Errors
    /// Returns `BuildError::NoRuntime` outside a tokio runtime.
    pub fn new(discipline: Discipline, limit: Limit) -> Result<Self, BuildError> {
        Self::builder()
            .with_discipline(discipline)
            .with_limit(limit)
            .build()
    }
}
