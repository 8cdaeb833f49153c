//! Logic scheduler
//!
//! Evaluates every running chamber once per tick at a fixed target rate. A
//! chamber's evaluation happens under its task lock, so lifecycle hooks called
//! from other threads serialize with the tick.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use operant_core::Timestamp;
use operant_time::{Pacer, StatsHandle};

use crate::manager::{guarded, panic_message};
use crate::{ChamberEntry, LifecycleManager, LoopRole, OperatorEvent, OperatorInput};

/// The task-logic loop
pub struct LogicScheduler {
    manager: LifecycleManager,
    input: Box<dyn OperatorInput>,
    pacer: Pacer,
}

impl LogicScheduler {
    pub fn new(manager: LifecycleManager, input: Box<dyn OperatorInput>, rate_hz: f64) -> Self {
        LogicScheduler {
            manager,
            input,
            pacer: Pacer::from_rate("logic", rate_hz),
        }
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.pacer.stats_handle()
    }

    /// One tick over every chamber
    pub fn pass(&mut self) {
        let now = self.manager.clock().now();
        let operator_events = self.input.poll();
        let mut wake = false;

        for entry in self.manager.registry().snapshot() {
            if entry.lifecycle.is_removal_requested() {
                entry.lifecycle.acknowledge(LoopRole::Logic);
                continue;
            }
            wake |= self.tick_chamber(&entry, now, &operator_events);
        }

        if wake {
            self.manager.notifier().notify();
        }
    }

    /// Evaluate one chamber; true if it has events for the dispatcher
    fn tick_chamber(&self, entry: &ChamberEntry, now: Timestamp, operator: &[OperatorEvent]) -> bool {
        let mut task = entry.task.lock();
        if !entry.lifecycle.is_run_enabled() || task.is_paused() {
            return entry.collect_events(task.as_mut());
        }

        let result = guarded(|| task.evaluate(now));
        let has_events = entry.collect_events(task.as_mut());
        let name = task.name();

        match result {
            Err(error) => {
                drop(task);
                self.manager.fault(entry, name, error);
                true
            }
            Ok(()) => {
                let mut presentation = entry.presentation.lock();
                let handled =
                    panic::catch_unwind(AssertUnwindSafe(|| presentation.handle_input(operator)));
                drop(presentation);
                if let Err(payload) = handled {
                    tracing::warn!(
                        chamber = entry.chamber.index(),
                        error = %panic_message(payload),
                        "operator input handling panicked"
                    );
                }
                if task.is_complete() {
                    drop(task);
                    self.manager.complete(entry, name);
                    return true;
                }
                has_events
            }
        }
    }

    /// Tick until `shutdown` is raised
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!(period_us = self.pacer.period().as_micros() as u64, "logic loop started");
        while !shutdown.load(Ordering::Acquire) {
            let started = Instant::now();
            self.pass();
            self.pacer.pace(started);
        }
        let stats = self.pacer.stats();
        let max_tick_us = stats.max_tick_duration.as_micros() as u64;
        if stats.overruns > 0 {
            tracing::warn!(
                ticks = stats.ticks,
                overruns = stats.overruns,
                max_tick_us,
                "logic loop stopped; some ticks overran"
            );
        } else {
            tracing::info!(ticks = stats.ticks, max_tick_us, "logic loop stopped");
        }
    }
}
