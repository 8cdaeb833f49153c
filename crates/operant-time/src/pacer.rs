//! Fixed-rate loop pacing
//!
//! Each loop measures how long its pass took and sleeps the remainder of its
//! period. A pass that overruns its period is counted and the schedule is
//! re-anchored at the current instant: missed ticks are skipped, never replayed
//! back-to-back.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Counters published by a paced loop
#[derive(Clone, Debug, Default)]
pub struct LoopStats {
    pub ticks: u64,
    pub overruns: u64,
    pub last_tick_duration: Duration,
    pub max_tick_duration: Duration,
}

/// Shared view of a loop's counters
pub type StatsHandle = Arc<Mutex<LoopStats>>;

/// Best-effort fixed-interval scheduler
pub struct Pacer {
    /// Loop name for diagnostics
    name: &'static str,
    /// Target period (zero = unthrottled)
    period: Duration,
    /// Deadline of the tick in progress
    deadline: Instant,
    stats: StatsHandle,
}

impl Pacer {
    /// Pacer with an explicit period
    pub fn new(name: &'static str, period: Duration) -> Self {
        Pacer {
            name,
            period,
            deadline: Instant::now(),
            stats: StatsHandle::default(),
        }
    }

    /// Pacer targeting `hz` ticks per second; non-positive rates are unthrottled
    pub fn from_rate(name: &'static str, hz: f64) -> Self {
        let period = if hz > 0.0 && hz.is_finite() {
            Duration::from_secs_f64(1.0 / hz)
        } else {
            Duration::ZERO
        };
        Self::new(name, period)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats_handle(&self) -> StatsHandle {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.lock().clone()
    }

    /// Record a finished pass that began at `started`
    ///
    /// Returns how long to sleep before the next pass.
    pub fn finish(&mut self, started: Instant) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(started);
        {
            let mut stats = self.stats.lock();
            stats.ticks += 1;
            stats.last_tick_duration = elapsed;
            stats.max_tick_duration = stats.max_tick_duration.max(elapsed);
        }

        if self.period.is_zero() {
            return Duration::ZERO;
        }

        self.deadline += self.period;
        if now >= self.deadline {
            let overruns = {
                let mut stats = self.stats.lock();
                stats.overruns += 1;
                stats.overruns
            };
            tracing::debug!(
                target: "operant::pacer",
                loop_name = self.name,
                elapsed_us = elapsed.as_micros() as u64,
                period_us = self.period.as_micros() as u64,
                overruns,
                "tick overran its period"
            );
            self.deadline = now;
            return Duration::ZERO;
        }
        self.deadline - now
    }

    /// Record a finished pass and sleep until the next one is due
    pub fn pace(&mut self, started: Instant) {
        let remaining = self.finish(started);
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}
