//! Event dispatcher
//!
//! Moves buffered events from chambers to their loggers on a separate thread,
//! so slow logger I/O never delays task evaluation. The dispatcher sleeps
//! until the logic loop or the lifecycle manager notifies it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{LifecycleManager, LoopRole};

pub struct EventDispatcher {
    manager: LifecycleManager,
    batches: u64,
}

impl EventDispatcher {
    pub fn new(manager: LifecycleManager) -> Self {
        EventDispatcher {
            manager,
            batches: 0,
        }
    }

    /// Batches forwarded so far
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Drain every chamber once
    pub fn pass(&mut self) {
        for entry in self.manager.registry().snapshot() {
            if entry.lifecycle.is_removal_requested() {
                // The removal worker drains what is left
                entry.lifecycle.acknowledge(LoopRole::Events);
                continue;
            }
            let batch = entry.events.swap();
            if batch.is_empty() {
                continue;
            }
            self.manager.deliver(&entry, &batch);
            self.batches += 1;
        }
    }

    /// Wait for notifications until `shutdown` is raised
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!("event dispatcher started");
        loop {
            self.manager.notifier().wait();
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            self.pass();
        }
        tracing::info!(batches = self.batches, "event dispatcher stopped");
    }
}
