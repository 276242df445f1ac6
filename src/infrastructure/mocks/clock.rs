//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock start of a fresh [`MockClock`]: 2024-01-01T00:00:00Z.
pub const MOCK_EPOCH_MILLIS: u64 = 1_704_067_200_000;

#[derive(Debug, Clone, Copy)]
struct MockTime {
    instant: Instant,
    wall: SystemTime,
}

/// Mock clock for testing.
///
/// Monotonic and wall-clock time move together, so counter windows, block
/// expiry and event lookbacks all observe the same jumps.
///
/// # Examples
///
/// ```
/// use gatekeeper::infrastructure::mocks::{MockClock, MOCK_EPOCH_MILLIS};
/// use gatekeeper::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// assert_eq!(clock.unix_millis(), MOCK_EPOCH_MILLIS);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// assert_eq!(clock.unix_millis(), MOCK_EPOCH_MILLIS + 10_000);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time, so advancing one clone
/// advances every clone.
///
/// ```
/// use gatekeeper::infrastructure::mocks::MockClock;
/// use gatekeeper::application::ports::Clock;
/// use std::time::Duration;
/// use std::thread;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// let clock_clone = clock.clone();
///
/// let handle = thread::spawn(move || {
///     clock_clone.advance(Duration::from_secs(5));
/// });
///
/// handle.join().unwrap();
/// assert_eq!(clock.now(), start + Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<MockTime>>,
}

impl MockClock {
    /// Create a clock at the current instant and [`MOCK_EPOCH_MILLIS`].
    pub fn new() -> Self {
        Self::starting_at(
            Instant::now(),
            UNIX_EPOCH + Duration::from_millis(MOCK_EPOCH_MILLIS),
        )
    }

    pub fn starting_at(instant: Instant, wall: SystemTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(MockTime { instant, wall })),
        }
    }

    /// Advance both clocks by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        time.instant += duration;
        time.wall += duration;
    }

    fn read(&self) -> MockTime {
        *self
            .current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.read().instant
    }

    fn wall(&self) -> SystemTime {
        self.read().wall
    }
}
