//! Dispatch disciplines and the limit parameter that goes with them.
//!
//! A limiter is configured once with a [`Discipline`] and a [`Limit`]. The
//! meaning of the limit depends on the discipline:
//!
//! - [`Discipline::Immediate`] / [`Discipline::Deferred`]: the maximum tolerable
//!   delay, in milliseconds, before a dispatch fails instead of waiting.
//! - [`Discipline::Queue`]: the capacity of each per-key queue.
//!
//! In both cases the raw sentinel `-1` ([`DISABLED_SENTINEL`]) turns the check off.

use std::fmt;

/// Raw limit value that disables the limit (or capacity) check entirely.
pub const DISABLED_SENTINEL: i64 = -1;

/// Strategy used to schedule dispatched actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Discipline {
    /// Run each action once after the key's not-before deadline, failing fast
    /// when the deadline is further away than the configured maximum delay.
    #[default]
    Immediate,
    /// Serialize actions per key through a FIFO queue drained by a single worker.
    Queue,
    /// Return a future immediately; the action settles it after the deadline.
    Deferred,
}

impl Discipline {
    /// Lowercase name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Discipline::Immediate => "immediate",
            Discipline::Queue => "queue",
            Discipline::Deferred => "deferred",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when converting a raw limit value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// Only `-1` is accepted as a negative value.
    #[error("limit must be -1 (disabled) or non-negative, got {0}")]
    Negative(i64),
}

/// Numeric limit attached to a discipline.
///
/// # Example
/// ```
/// use call_governor::Limit;
///
/// assert_eq!(Limit::try_from(-1), Ok(Limit::Disabled));
/// assert_eq!(Limit::try_from(250), Ok(Limit::Max(250)));
/// assert!(Limit::try_from(-7).is_err());
///
/// let limit = Limit::Max(100);
/// assert!(limit.allows_delay(100));
/// assert!(!limit.allows_delay(101));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Limit {
    /// No limit: every delay is tolerated and queues are unbounded.
    #[default]
    Disabled,
    /// Maximum delay in milliseconds, or maximum queue length.
    Max(u64),
}

impl Limit {
    /// Check whether the limit is switched off.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Limit::Disabled)
    }

    /// Configured value, if any.
    pub fn value(&self) -> Option<u64> {
        match self {
            Limit::Disabled => None,
            Limit::Max(value) => Some(*value),
        }
    }

    /// Check a signed delay (milliseconds until not-before) against the limit.
    ///
    /// Negative delays mean the deadline already passed and are always allowed.
    pub fn allows_delay(&self, delay_ms: i64) -> bool {
        match self {
            Limit::Disabled => true,
            Limit::Max(max) => delay_ms <= i64::try_from(*max).unwrap_or(i64::MAX),
        }
    }

    /// Check whether a queue currently holding `len` items may accept one more.
    pub fn has_room(&self, len: usize) -> bool {
        match self {
            Limit::Disabled => true,
            Limit::Max(capacity) => (len as u64) < *capacity,
        }
    }

    /// Raw representation, with [`DISABLED_SENTINEL`] for a disabled limit.
    pub fn to_raw(&self) -> i64 {
        match self {
            Limit::Disabled => DISABLED_SENTINEL,
            Limit::Max(value) => i64::try_from(*value).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<i64> for Limit {
    type Error = LimitError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            DISABLED_SENTINEL => Ok(Limit::Disabled),
            n if n >= 0 => Ok(Limit::Max(n as u64)),
            n => Err(LimitError::Negative(n)),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Disabled => f.write_str("disabled"),
            Limit::Max(value) => write!(f, "{}", value),
        }
    }
}

/// Which pending timers a "limit exceeded" failure cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CancellationScope {
    /// Only the timers pending for the key whose limit was exceeded.
    #[default]
    Key,
    /// Every timer pending on the limiter instance, across all keys.
    Instance,
}
