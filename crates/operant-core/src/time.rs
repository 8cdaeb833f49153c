//! Time primitives
//!
//! The engine reasons about two kinds of time:
//! - `Timestamp`: a reading of the engine's monotonic clock (μs since clock origin)
//! - `TaskTime`: an offset relative to a task's start, carried by events

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Monotonic clock reading, in microseconds since the clock origin
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis * 1000)
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs.max(0.0) * 1_000_000.0) as u64)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Later of two readings
    #[inline]
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs.as_micros() as u64))
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_since(rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.6}s", self.as_secs_f64())
    }
}

/// Offset from a task's start, in microseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TaskTime(pub u64);

impl TaskTime {
    pub const ZERO: TaskTime = TaskTime(0);

    /// Offset of `now` relative to `start`
    #[inline]
    pub fn between(start: Timestamp, now: Timestamp) -> Self {
        TaskTime(now.0.saturating_sub(start.0))
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        TaskTime(millis * 1000)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl fmt::Debug for TaskTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:.6}s", self.as_secs_f64())
    }
}

/// Serialized as fractional seconds, the unit loggers write
impl Serialize for TaskTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversions() {
        let t = Timestamp::from_millis(1500);
        assert_eq!(t.as_micros(), 1_500_000);
        assert!((t.as_secs_f64() - 1.5).abs() < 1e-9);
        assert_eq!(Timestamp::from_secs_f64(-1.0), Timestamp::ZERO);
    }

    #[test]
    fn test_timestamp_saturating_since() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(250);
        assert_eq!(b - a, Duration::from_millis(150));
        assert_eq!(a - b, Duration::ZERO);
        assert_eq!(a + Duration::from_millis(150), b);
    }

    #[test]
    fn test_task_time_between() {
        let start = Timestamp::from_millis(1000);
        let now = Timestamp::from_millis(3500);
        assert_eq!(TaskTime::between(start, now), TaskTime::from_millis(2500));
        assert_eq!(TaskTime::between(now, start), TaskTime::ZERO);
    }

    #[test]
    fn test_task_time_serializes_as_seconds() {
        let json = serde_json::to_string(&TaskTime::from_millis(1250)).unwrap();
        assert_eq!(json, "1.25");
    }
}
