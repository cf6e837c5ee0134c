//! # call-governor
//!
//! Client-side call-rate governing driven by the hints servers send back.
//!
//! Calls are grouped by a **call-key** (typically one per endpoint). For each
//! key the limiter learns a *not-before* instant from the `Retry-After` style
//! headers that earlier calls returned, and schedules later calls so they never
//! start sooner. A limit bounds how long a caller is willing to wait (or how
//! many calls may queue up).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use call_governor::{CallLimiter, Discipline, Headers, Limit};
//!
//! # async fn demo() {
//! // Fail fast when the server asks us to wait more than 2 seconds.
//! let limiter = CallLimiter::new(Discipline::Immediate, Limit::Max(2_000)).unwrap();
//!
//! let result = limiter.dispatch_with("GET /search", |reporter| {
//!     // ... perform the external call, then report what came back ...
//!     let response = Headers::new().with("Retry-After", "1");
//!     reporter.report(&response);
//! });
//!
//! if let Err(err) = result {
//!     eprintln!("not calling: {err}");
//! }
//! # }
//! ```
//!
//! ## Disciplines
//!
//! The discipline is fixed when the limiter is built:
//!
//! - **Immediate** (default): every accepted call gets its own timer and runs
//!   at the key's not-before instant. Calls whose wait would exceed the limit
//!   fail with [`DispatchError::LimitExceeded`].
//! - **Queue**: calls for a key run one at a time in dispatch order. The limit
//!   is the queue capacity ([`DispatchError::QueueFull`] when reached). A hint
//!   reported by one call delays the next one.
//! - **Deferred**: like immediate, but [`CallLimiter::dispatch_deferred`]
//!   returns a future that resolves with whatever the action passes to its
//!   [`Resolver`].
//!
//! ```rust,no_run
//! use call_governor::{CallLimiter, Discipline, Limit, Resolver};
//!
//! # async fn demo() {
//! let limiter = CallLimiter::new(Discipline::Deferred, Limit::Max(5_000)).unwrap();
//!
//! let status = limiter
//!     .dispatch_deferred("GET /orders", |resolver: Resolver<u16, String>, _reporter| {
//!         resolver.resolve(200)
//!     })
//!     .await;
//! assert_eq!(status, Ok(200));
//! # }
//! ```
//!
//! ## Hints
//!
//! A `Retry-After` value below one month of seconds is read as a relative
//! delay; anything else as an absolute time (HTTP-date, RFC 3339, or epoch
//! milliseconds). Alternative header names are configured with
//! [`CallLimiterBuilder::with_retry_after_aliases`]; the
//! `x-rate-limit-remaining` / `x-rate-limit-reset` pair is honored with
//! [`CallLimiterBuilder::with_reset_headers`].
//!
//! A key's not-before instant never moves backwards: a smaller hint is
//! ignored.
//!
//! ## Cancellation
//!
//! When a dispatch fails with `LimitExceeded`, the limiter cancels timers that
//! are still pending. [`CancellationScope::Key`] (default) cancels only the
//! failing key's; [`CancellationScope::Instance`] cancels every key's.
//!
//! ## Observability
//!
//! The limiter logs through `tracing` (no subscriber is installed) and keeps
//! counters:
//!
//! ```rust,no_run
//! # use call_governor::{CallLimiter, Discipline, Limit};
//! # async fn demo() {
//! # let limiter = CallLimiter::new(Discipline::Queue, Limit::Max(16)).unwrap();
//! let snapshot = limiter.metrics().snapshot();
//! println!("executed: {}", snapshot.calls_executed);
//! println!("rejection rate: {:.2}%", snapshot.rejection_rate() * 100.0);
//! # }
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    call_state::CallState,
    headers::{HeaderValue, Headers},
    hint::{Hint, HintParser, SECONDS_IN_MONTH},
    limit::{CancellationScope, Discipline, Limit, LimitError, DISABLED_SENTINEL},
};

pub use application::{
    dispatch::deferred::{Deferred, Resolver},
    error::{DeferredError, DispatchError},
    limiter::LimiterCore,
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, Storage},
    registry::{CallRegistry, KeyState},
    reporter::{HeaderReporter, HintSink},
};

pub use infrastructure::{
    builder::{BuildError, CallLimiter, CallLimiterBuilder, DefaultStorage},
    clock::SystemClock,
    storage::ShardedStorage,
};
