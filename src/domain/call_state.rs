//! Per-key timing state.

use std::time::{Duration, Instant};

/// Earliest instant at which a call-key may run again.
///
/// The not-before instant only ever moves forward: merging a candidate that
/// is earlier than the current value leaves the state untouched.
///
/// # Example
/// ```
/// use call_governor::CallState;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut state = CallState::new(now);
///
/// assert!(state.merge(now + Duration::from_secs(5)));
/// assert!(!state.merge(now + Duration::from_secs(1)));
/// assert_eq!(state.not_before(), now + Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallState {
    not_before: Instant,
}

impl CallState {
    /// Unrestricted state: the key may run right away.
    pub fn new(now: Instant) -> Self {
        Self { not_before: now }
    }

    /// Current not-before instant.
    pub fn not_before(&self) -> Instant {
        self.not_before
    }

    /// Fold a candidate in with `max`. Returns true if the state moved.
    pub fn merge(&mut self, candidate: Instant) -> bool {
        if candidate > self.not_before {
            self.not_before = candidate;
            true
        } else {
            false
        }
    }

    /// Time left until not-before, clamped at zero. Used to schedule timers.
    pub fn wait(&self, now: Instant) -> Duration {
        self.not_before.saturating_duration_since(now)
    }

    /// Signed milliseconds until not-before. Negative once the deadline passed.
    ///
    /// This unclamped value is what limits are checked against.
    pub fn delay_ms(&self, now: Instant) -> i64 {
        if self.not_before >= now {
            millis(self.not_before - now)
        } else {
            -millis(now - self.not_before)
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_unrestricted() {
        let now = Instant::now();
        let state = CallState::new(now);

        assert_eq!(state.not_before(), now);
        assert_eq!(state.wait(now), Duration::ZERO);
        assert_eq!(state.delay_ms(now), 0);
    }

    #[test]
    fn test_merge_is_monotonic() {
        let now = Instant::now();
        let mut state = CallState::new(now);

        assert!(state.merge(now + Duration::from_secs(3)));
        assert!(!state.merge(now + Duration::from_secs(2)));
        assert!(!state.merge(now));
        assert!(!state.merge(now + Duration::from_secs(3)));
        assert_eq!(state.not_before(), now + Duration::from_secs(3));

        assert!(state.merge(now + Duration::from_secs(4)));
        assert_eq!(state.not_before(), now + Duration::from_secs(4));
    }

    #[test]
    fn test_delay_is_signed() {
        let now = Instant::now();
        let mut state = CallState::new(now);
        state.merge(now + Duration::from_millis(500));

        assert_eq!(state.delay_ms(now), 500);
        assert_eq!(state.delay_ms(now + Duration::from_millis(800)), -300);
        assert_eq!(
            state.wait(now + Duration::from_millis(800)),
            Duration::ZERO
        );
        assert_eq!(state.wait(now), Duration::from_millis(500));
    }
}
