//! Chamber lifecycle management
//!
//! The manager is the only code that inserts into or deletes from the chamber
//! registry. Removal is a handshake: the manager raises the chamber's removal
//! flag, each loop acknowledges it on its next pass, and a dedicated worker
//! thread deletes the entry once all three have let go.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use operant_core::{ChamberId, Components, Event, EventLogger, TaskMetadata};
use operant_task::{Protocol, Task, TaskContext, TaskError, TaskRegistry, TaskSnapshot};
use operant_time::Clock;

use crate::{
    ChamberEntry, ChamberLayout, ChamberNotice, ChamberPhase, ChamberRegistry, EventNotifier,
    NoticeSink, Presentation, RuntimeError, RuntimeResult,
};

/// How long a removal waits for the loops before reporting that it is stuck
const STALLED_REMOVAL_REPORT: Duration = Duration::from_secs(5);

/// Everything needed to add a chamber
pub struct ChamberSetup {
    pub chamber: ChamberId,
    /// Registered task name
    pub task: String,
    pub metadata: TaskMetadata,
    pub protocol: Protocol,
    pub components: Components,
    pub loggers: Vec<Box<dyn EventLogger>>,
    pub presentation: Box<dyn Presentation>,
}

/// Read-only view of one chamber
#[derive(Clone, Debug)]
pub struct ChamberStatus {
    pub chamber: ChamberId,
    pub phase: ChamberPhase,
    pub snapshot: TaskSnapshot,
    pub pending_events: usize,
}

struct Shared {
    registry: ChamberRegistry,
    tasks: TaskRegistry,
    clock: Arc<dyn Clock>,
    notifier: EventNotifier,
    notices: NoticeSink,
    layout: ChamberLayout,
}

/// Add/start/stop/pause/resume/remove for the chambers of one workstation
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct LifecycleManager {
    shared: Arc<Shared>,
}

/// Completion handle of a removal
#[must_use = "a removal runs in the background; join it to wait for the deletion"]
pub struct RemovalHandle {
    chamber: ChamberId,
    worker: Option<JoinHandle<()>>,
}

impl RemovalHandle {
    pub fn chamber(&self) -> ChamberId {
        self.chamber
    }

    /// True for a repeated `remove` that started no worker
    pub fn is_noop(&self) -> bool {
        self.worker.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the entry has been deleted
    pub fn join(self) -> RuntimeResult<()> {
        match self.worker {
            Some(worker) => worker
                .join()
                .map_err(|_| RuntimeError::RemovalPanicked(self.chamber)),
            None => Ok(()),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a task hook, turning a panic into a task error
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, TaskError>) -> Result<T, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload))))
}

/// Run a logger or presentation call, turning a panic into an error message
pub(crate) fn contained<T, E: fmt::Display>(
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
    }
}

impl LifecycleManager {
    pub fn new(
        tasks: TaskRegistry,
        clock: Arc<dyn Clock>,
        layout: ChamberLayout,
        notices: NoticeSink,
    ) -> Self {
        LifecycleManager {
            shared: Arc::new(Shared {
                registry: ChamberRegistry::new(),
                tasks,
                clock,
                notifier: EventNotifier::new(),
                notices,
                layout,
            }),
        }
    }

    pub fn registry(&self) -> &ChamberRegistry {
        &self.shared.registry
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.shared.tasks
    }

    pub fn clock(&self) -> &dyn Clock {
        self.shared.clock.as_ref()
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.shared.notifier
    }

    pub fn notices(&self) -> &NoticeSink {
        &self.shared.notices
    }

    pub fn layout(&self) -> ChamberLayout {
        self.shared.layout
    }

    /// Build the chamber's task and insert its entry with all flags cleared
    ///
    /// Nothing becomes visible to the loops unless construction succeeds.
    pub fn add(&self, setup: ChamberSetup) -> RuntimeResult<()> {
        let chamber = setup.chamber;
        let cells = self.shared.layout.cells();
        if chamber.index() >= cells {
            return Err(RuntimeError::ChamberOutOfRange { chamber, cells });
        }
        if self.shared.registry.contains(chamber) {
            return Err(RuntimeError::ChamberOccupied(chamber));
        }
        let ctx = TaskContext {
            metadata: setup.metadata,
            components: setup.components,
            protocol: setup.protocol,
            now: self.shared.clock.now(),
        };
        let task = self.shared.tasks.create(&setup.task, &ctx)?;
        let name = task.name();
        let region = self.shared.layout.region(chamber);
        let entry = ChamberEntry::new(chamber, task, setup.loggers, setup.presentation, region);
        self.shared.registry.insert(entry)?;
        tracing::info!(
            chamber = chamber.index(),
            task = name,
            subject = %ctx.metadata.subject,
            "chamber added"
        );
        Ok(())
    }

    fn live_entry(&self, chamber: ChamberId) -> RuntimeResult<Arc<ChamberEntry>> {
        let entry = self.shared.registry.require(chamber)?;
        if entry.lifecycle.is_removal_requested() {
            return Err(RuntimeError::ChamberRemoving(chamber));
        }
        Ok(entry)
    }

    /// Start the task, then its loggers, then let the logic loop run it
    pub fn start(&self, chamber: ChamberId) -> RuntimeResult<()> {
        let entry = self.live_entry(chamber)?;
        let now = self.shared.clock.now();
        let mut task = entry.task.lock();
        if task.is_started() {
            return Ok(());
        }
        guarded(|| task.start(now))?;

        {
            let mut loggers = entry.loggers.lock();
            for logger in loggers.iter_mut() {
                if let Err(e) = contained(|| logger.start()) {
                    self.logger_failed(chamber, logger.name(), &e);
                }
            }
        }

        if entry.collect_events(task.as_mut()) {
            self.shared.notifier.notify();
        }
        entry.lifecycle.set_run_enabled(true);
        tracing::info!(chamber = chamber.index(), task = task.name(), "chamber started");
        Ok(())
    }

    /// Stop evaluating the chamber and run the task's stop hook
    pub fn stop(&self, chamber: ChamberId) -> RuntimeResult<()> {
        let entry = self.live_entry(chamber)?;
        self.stop_entry(&entry)
    }

    pub(crate) fn stop_entry(&self, entry: &ChamberEntry) -> RuntimeResult<()> {
        entry.lifecycle.set_run_enabled(false);
        let mut task = entry.task.lock();
        if !task.is_started() {
            return Ok(());
        }
        let now = self.shared.clock.now();
        let result = guarded(|| task.stop(now));
        if entry.collect_events(task.as_mut()) {
            self.shared.notifier.notify();
        }
        tracing::info!(chamber = entry.chamber.index(), task = task.name(), "chamber stopped");
        result.map_err(RuntimeError::from)
    }

    pub fn pause(&self, chamber: ChamberId) -> RuntimeResult<()> {
        let entry = self.live_entry(chamber)?;
        let now = self.shared.clock.now();
        entry.task.lock().pause(now);
        tracing::info!(chamber = chamber.index(), "chamber paused");
        Ok(())
    }

    pub fn resume(&self, chamber: ChamberId) -> RuntimeResult<()> {
        let entry = self.live_entry(chamber)?;
        let now = self.shared.clock.now();
        entry.task.lock().resume(now);
        tracing::info!(chamber = chamber.index(), "chamber resumed");
        Ok(())
    }

    /// Request removal of `chamber`
    ///
    /// Returns immediately. A worker thread waits for the three loops to
    /// acknowledge, delivers the chamber's last events, closes its loggers
    /// (when `close_loggers` is set) and components, then deletes the entry.
    /// A second call for a chamber already being removed is a no-op.
    pub fn remove(&self, chamber: ChamberId, close_loggers: bool) -> RuntimeResult<RemovalHandle> {
        let entry = self.shared.registry.require(chamber)?;
        if !entry.lifecycle.request_removal() {
            return Ok(RemovalHandle {
                chamber,
                worker: None,
            });
        }
        self.shared.notifier.notify();
        tracing::info!(chamber = chamber.index(), "chamber removal requested");

        let manager = self.clone();
        let name = format!("chamber-remove-{}", chamber.index());
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || manager.finish_removal(&entry, close_loggers))
            .map_err(|source| RuntimeError::ThreadSpawn { name, source })?;
        Ok(RemovalHandle {
            chamber,
            worker: Some(worker),
        })
    }

    fn finish_removal(&self, entry: &ChamberEntry, close_loggers: bool) {
        let chamber = entry.chamber;
        let waiting = Instant::now();
        while !entry.lifecycle.wait_quiesced_for(STALLED_REMOVAL_REPORT) {
            tracing::warn!(
                chamber = chamber.index(),
                waited_ms = waiting.elapsed().as_millis() as u64,
                lifecycle = ?entry.lifecycle,
                "removal still waiting for the engine loops"
            );
        }

        let (pending, components) = {
            let mut task = entry.task.lock();
            entry.collect_events(task.as_mut());
            (entry.events.swap(), task.components().clone())
        };
        self.deliver(entry, &pending);

        if close_loggers {
            let mut loggers = entry.loggers.lock();
            for logger in loggers.iter_mut() {
                if let Err(e) = contained(|| logger.close()) {
                    self.logger_failed(chamber, logger.name(), &e);
                }
            }
        }
        for error in components.close_all() {
            tracing::warn!(chamber = chamber.index(), %error, "component failed to close");
        }

        self.shared.registry.delete(chamber);
        tracing::info!(
            chamber = chamber.index(),
            final_events = pending.len(),
            "chamber removed"
        );
        self.shared.notices.send(ChamberNotice::Removed { chamber });
    }

    /// Forward `events` once to every started logger, in registration order
    ///
    /// A logger that fails or panics is reported and skipped; the others still
    /// receive the batch.
    pub(crate) fn deliver(&self, entry: &ChamberEntry, events: &[Event]) {
        let mut loggers = entry.loggers.lock();
        for logger in loggers.iter_mut() {
            if !logger.is_started() {
                continue;
            }
            if let Err(e) = contained(|| logger.log_events(events)) {
                self.logger_failed(entry.chamber, logger.name(), &e);
            }
        }
    }

    fn logger_failed(&self, chamber: ChamberId, logger: &str, error: &dyn fmt::Display) {
        tracing::warn!(chamber = chamber.index(), logger, %error, "event logger failed");
        self.shared.notices.send(ChamberNotice::LoggerFailed {
            chamber,
            logger: logger.to_string(),
            error: error.to_string(),
        });
    }

    /// Stop a chamber whose evaluation failed
    pub(crate) fn fault(&self, entry: &ChamberEntry, task: &'static str, error: TaskError) {
        let chamber = entry.chamber;
        tracing::warn!(chamber = chamber.index(), task, %error, "task faulted; stopping chamber");
        if let Err(stop_error) = self.stop_entry(entry) {
            tracing::warn!(chamber = chamber.index(), error = %stop_error, "stop after fault failed");
        }
        self.shared.notices.send(ChamberNotice::Faulted {
            chamber,
            task,
            error: error.to_string(),
        });
    }

    /// Stop a chamber whose task reported completion
    pub(crate) fn complete(&self, entry: &ChamberEntry, task: &'static str) {
        let chamber = entry.chamber;
        tracing::info!(chamber = chamber.index(), task, "task complete");
        if let Err(error) = self.stop_entry(entry) {
            tracing::warn!(chamber = chamber.index(), %error, "stop after completion failed");
        }
        self.shared.notices.send(ChamberNotice::Completed { chamber, task });
    }

    pub fn phase(&self, chamber: ChamberId) -> Option<ChamberPhase> {
        self.shared
            .registry
            .get(chamber)
            .map(|entry| entry.lifecycle.phase())
    }

    pub fn status(&self, chamber: ChamberId) -> Option<ChamberStatus> {
        let entry = self.shared.registry.get(chamber)?;
        let snapshot = entry.task.lock().snapshot();
        Some(ChamberStatus {
            chamber,
            phase: entry.lifecycle.phase(),
            snapshot,
            pending_events: entry.events.len(),
        })
    }

    pub fn chambers(&self) -> Vec<ChamberId> {
        self.shared.registry.ids()
    }
}
