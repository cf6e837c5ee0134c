//! The header-reporting capability handed to actions.
//!
//! Actions close the feedback loop by reporting the headers their external
//! call returned. The reporter is bound to the dispatching call-key.

use crate::domain::headers::Headers;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Destination of reported headers.
pub trait HintSink: Send + Sync {
    /// Fold the hint carried by `headers` into `key`'s state.
    ///
    /// Returns the new not-before instant if it moved forward.
    fn report(&self, key: &str, headers: &Headers) -> Option<Instant>;
}

/// Reports headers for one call-key.
///
/// Immediate and queue actions receive a `&HeaderReporter` that cannot outlive
/// the action's body: whatever the action reports is applied before the
/// dispatcher schedules the key's next call. Deferred actions own theirs and
/// may report later, from asynchronous work.
///
/// # Example
/// ```no_run
/// # use call_governor::{CallLimiter, Discipline, Headers, Limit};
/// # async fn demo(limiter: CallLimiter) {
/// limiter
///     .dispatch_with("search", |reporter| {
///         // ... perform the external call ...
///         reporter.report(&Headers::new().with("Retry-After", "2"));
///     })
///     .unwrap();
/// # }
/// ```
pub struct HeaderReporter {
    key: String,
    sink: Arc<dyn HintSink>,
}

impl HeaderReporter {
    /// Bind a reporter to `key`.
    pub fn new(key: impl Into<String>, sink: Arc<dyn HintSink>) -> Self {
        Self {
            key: key.into(),
            sink,
        }
    }

    /// Call-key this reporter is bound to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Report headers returned by the external call.
    ///
    /// Returns the key's new not-before instant if the hint made it stricter.
    pub fn report(&self, headers: &Headers) -> Option<Instant> {
        self.sink.report(&self.key, headers)
    }
}

impl fmt::Debug for HeaderReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderReporter")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
