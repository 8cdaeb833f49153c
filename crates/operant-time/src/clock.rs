//! Clock implementations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use operant_core::Timestamp;

/// Source of engine time
///
/// INVARIANT: successive calls to `now` never return a smaller value.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the OS monotonic clock
pub struct MonotonicClock {
    /// Reference instant (clock origin)
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }

    /// Time since the clock origin
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.origin.elapsed().as_micros() as u64)
    }
}

/// Clock that only moves when told to
///
/// Clones share the same reading, so a test can hold one handle while the
/// engine reads another.
#[derive(Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(t: Timestamp) -> Self {
        ManualClock {
            micros: Arc::new(AtomicU64::new(t.as_micros())),
        }
    }

    /// Move the clock forward by `dt`
    pub fn advance(&self, dt: Duration) -> Timestamp {
        let dt = dt.as_micros() as u64;
        let prev = self.micros.fetch_add(dt, Ordering::AcqRel);
        Timestamp::from_micros(prev + dt)
    }

    /// Jump to `t`; only allowed to move forward
    pub fn set(&self, t: Timestamp) {
        self.micros.fetch_max(t.as_micros(), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::Acquire))
    }
}
