//! Errors surfaced to callers of the limiter.

use crate::domain::limit::{Discipline, Limit};

/// Synchronous dispatch failure.
///
/// Both rejection kinds are recoverable by the caller (retry later, back off);
/// the limiter itself never retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The key's not-before deadline is further away than the maximum delay.
    #[error("call limit exceeded for `{key}`: next call allowed in {delay_ms}ms, limit is {limit_ms}ms")]
    LimitExceeded {
        /// Call-key that was rejected.
        key: String,
        /// Milliseconds until the key's not-before deadline.
        delay_ms: i64,
        /// Configured maximum tolerable delay.
        limit_ms: u64,
    },
    /// The key's bounded queue is at capacity.
    #[error("queue for `{key}` is full (capacity {capacity})")]
    QueueFull {
        /// Call-key that was rejected.
        key: String,
        /// Configured queue capacity.
        capacity: u64,
    },
    /// The method used does not belong to the configured discipline.
    #[error("`{method}` is not available with the {configured} discipline")]
    WrongDiscipline {
        /// Discipline the limiter was built with.
        configured: Discipline,
        /// Name of the refused method.
        method: &'static str,
    },
}

impl DispatchError {
    pub(crate) fn limit_exceeded(key: &str, delay_ms: i64, limit: Limit) -> Self {
        DispatchError::LimitExceeded {
            key: key.to_string(),
            delay_ms,
            limit_ms: limit.value().unwrap_or(u64::MAX),
        }
    }

    pub(crate) fn queue_full(key: &str, capacity: Limit) -> Self {
        DispatchError::QueueFull {
            key: key.to_string(),
            capacity: capacity.value().unwrap_or(u64::MAX),
        }
    }

    /// Call-key the error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            DispatchError::LimitExceeded { key, .. } | DispatchError::QueueFull { key, .. } => {
                Some(key)
            }
            DispatchError::WrongDiscipline { .. } => None,
        }
    }
}

/// Outcome of a deferred dispatch that did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeferredError<E> {
    /// The dispatch itself was refused; the action never ran.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The action rejected with this value.
    #[error("deferred call rejected")]
    Rejected(E),
    /// The action never settled: its resolver was dropped, it panicked, or
    /// its timer was cancelled before firing.
    #[error("deferred call abandoned before settling")]
    Abandoned,
}

impl<E> DeferredError<E> {
    /// The rejection value, if the action rejected.
    pub fn into_rejected(self) -> Option<E> {
        match self {
            DeferredError::Rejected(value) => Some(value),
            _ => None,
        }
    }
}
