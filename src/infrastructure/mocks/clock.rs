//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of hint arithmetic and limit checks. The monotonic and wall-clock
/// readings move together.
///
/// # Examples
///
/// ```
/// use call_governor::infrastructure::mocks::MockClock;
/// use call_governor::application::ports::Clock;
/// use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
///
/// let start = Instant::now();
/// let wall = UNIX_EPOCH + Duration::from_secs(1_800_000_000);
/// let clock = MockClock::with_wall_clock(start, wall);
///
/// // Time starts at the specified instant
/// assert_eq!(clock.now(), start);
/// assert_eq!(clock.wall_now(), wall);
///
/// // Advance time explicitly
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// assert_eq!(clock.wall_now(), wall + Duration::from_secs(10));
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across threads.
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<(Instant, SystemTime)>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    ///
    /// The wall clock starts at the real current time.
    pub fn new(start: Instant) -> Self {
        Self::with_wall_clock(start, SystemTime::now())
    }

    /// Create a mock clock with explicit monotonic and wall-clock starting points.
    pub fn with_wall_clock(start: Instant, wall: SystemTime) -> Self {
        Self {
            current_time: Arc::new(Mutex::new((start, wall))),
        }
    }

    /// Advance both readings by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        time.0 += duration;
        time.1 += duration;
    }

    /// Set the monotonic reading, moving the wall clock by the same amount.
    pub fn set(&self, instant: Instant) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        if instant >= time.0 {
            let forward = instant - time.0;
            time.1 += forward;
        } else {
            let backward = time.0 - instant;
            time.1 -= backward;
        }
        time.0 = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
            .0
    }

    fn wall_now(&self) -> SystemTime {
        self.current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
            .1
    }
}
