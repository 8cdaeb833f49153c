//! Presentation loop
//!
//! Refreshes every chamber's presentation at a capped frame rate from a
//! read-only task snapshot. Draw failures and panics are logged and the frame
//! moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use operant_time::{Pacer, StatsHandle};

use crate::manager::contained;
use crate::{Frame, LifecycleManager, LoopRole};

pub struct PresentationLoop {
    manager: LifecycleManager,
    pacer: Pacer,
    frame: u64,
}

impl PresentationLoop {
    pub fn new(manager: LifecycleManager, frame_rate_hz: f64) -> Self {
        PresentationLoop {
            manager,
            pacer: Pacer::from_rate("presentation", frame_rate_hz),
            frame: 0,
        }
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.pacer.stats_handle()
    }

    /// Draw one frame
    pub fn pass(&mut self) {
        self.frame += 1;
        for entry in self.manager.registry().snapshot() {
            if entry.lifecycle.is_removal_requested() {
                entry.lifecycle.acknowledge(LoopRole::Presentation);
                continue;
            }
            let snapshot = entry.task.lock().snapshot();
            let frame = Frame {
                number: self.frame,
                region: entry.region,
                snapshot,
            };
            if let Err(error) = contained(|| entry.presentation.lock().draw(&frame)) {
                tracing::warn!(chamber = entry.chamber.index(), %error, "draw failed");
            }
        }
    }

    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!(period_us = self.pacer.period().as_micros() as u64, "presentation loop started");
        while !shutdown.load(Ordering::Acquire) {
            let started = Instant::now();
            self.pass();
            self.pacer.pace(started);
        }
        tracing::info!(frames = self.frame, "presentation loop stopped");
    }
}
