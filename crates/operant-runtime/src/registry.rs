//! Chamber registry
//!
//! The registry maps chamber ids to their entries. Loops iterate over a
//! snapshot of the entry list, so an insertion or deletion never invalidates a
//! pass in progress. Entries are only inserted and deleted by the lifecycle
//! manager; every other access goes through the entry's own locks.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use operant_core::{ChamberId, Event, EventLogger};
use operant_task::Task;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::{Lifecycle, Presentation, Region, RuntimeError, RuntimeResult};

/// Events waiting for the dispatcher
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: Mutex<Vec<Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in production order
    pub fn append(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            *pending = events;
        } else {
            pending.extend(events);
        }
    }

    /// Swap the buffer for an empty one
    pub fn swap(&self) -> Vec<Event> {
        mem::take(&mut *self.pending.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Everything the engine holds for one chamber
pub struct ChamberEntry {
    pub chamber: ChamberId,
    pub task: Mutex<Box<dyn Task>>,
    pub events: EventBuffer,
    /// In registration order
    pub loggers: Mutex<Vec<Box<dyn EventLogger>>>,
    pub presentation: Mutex<Box<dyn Presentation>>,
    pub region: Region,
    pub lifecycle: Lifecycle,
}

impl ChamberEntry {
    pub fn new(
        chamber: ChamberId,
        task: Box<dyn Task>,
        loggers: Vec<Box<dyn EventLogger>>,
        presentation: Box<dyn Presentation>,
        region: Region,
    ) -> Self {
        ChamberEntry {
            chamber,
            task: Mutex::new(task),
            events: EventBuffer::new(),
            loggers: Mutex::new(loggers),
            presentation: Mutex::new(presentation),
            region,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Move events the task has buffered into the dispatch buffer
    pub fn collect_events(&self, task: &mut dyn Task) -> bool {
        if task.has_events() {
            self.events.append(task.take_events());
        }
        !self.events.is_empty()
    }
}

impl fmt::Debug for ChamberEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChamberEntry")
            .field("chamber", &self.chamber)
            .field("region", &self.region)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Shared chamber id → entry mapping
#[derive(Debug, Default)]
pub struct ChamberRegistry {
    entries: RwLock<BTreeMap<ChamberId, Arc<ChamberEntry>>>,
}

impl ChamberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry`; fails if its chamber already holds one
    pub fn insert(&self, entry: ChamberEntry) -> RuntimeResult<Arc<ChamberEntry>> {
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.chamber) {
            return Err(RuntimeError::ChamberOccupied(entry.chamber));
        }
        let entry = Arc::new(entry);
        entries.insert(entry.chamber, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn get(&self, chamber: ChamberId) -> Option<Arc<ChamberEntry>> {
        self.entries.read().get(&chamber).cloned()
    }

    pub fn require(&self, chamber: ChamberId) -> RuntimeResult<Arc<ChamberEntry>> {
        self.get(chamber)
            .ok_or(RuntimeError::UnknownChamber(chamber))
    }

    pub(crate) fn delete(&self, chamber: ChamberId) -> Option<Arc<ChamberEntry>> {
        self.entries.write().remove(&chamber)
    }

    pub fn contains(&self, chamber: ChamberId) -> bool {
        self.entries.read().contains_key(&chamber)
    }

    /// Entries at this instant, in chamber order
    pub fn snapshot(&self) -> Vec<Arc<ChamberEntry>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ChamberId> {
        self.entries.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Wake-up signal for the event dispatcher
///
/// Setting an already-set notifier is a no-op; `wait` clears it.
#[derive(Debug, Default)]
pub struct EventNotifier {
    set: Mutex<bool>,
    cond: Condvar,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut set = self.set.lock();
        if !*set {
            *set = true;
            self.cond.notify_one();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Block until notified, then clear
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.cond.wait(&mut set);
        }
        *set = false;
    }

    /// Block until notified or `timeout` elapses; true if notified
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if !*set {
            self.cond.wait_for(&mut set, timeout);
        }
        mem::replace(&mut *set, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operant_core::{Components, Metadata, TaskMetadata, TaskTime, Timestamp};
    use operant_task::{StateMachine, TaskInstance, TaskLogic, TaskResult};
    use std::thread;

    use crate::Frame;

    operant_task::task_states! {
        enum Idle {
            Waiting => "WAITING",
        }
    }

    struct Nothing;

    impl TaskLogic for Nothing {
        type State = Idle;

        fn step(&mut self, _machine: &mut StateMachine<Idle>) -> TaskResult<()> {
            Ok(())
        }

        fn is_complete(&self, _machine: &StateMachine<Idle>) -> bool {
            false
        }
    }

    struct Blank;

    impl Presentation for Blank {
        fn draw(&mut self, _frame: &Frame) -> RuntimeResult<()> {
            Ok(())
        }
    }

    fn entry(index: u32) -> ChamberEntry {
        let chamber = ChamberId::new(index);
        let task = TaskInstance::new(
            "Nothing",
            Nothing,
            Idle::Waiting,
            TaskMetadata::new(chamber, "s"),
            Components::new(),
            Timestamp::ZERO,
        );
        ChamberEntry::new(chamber, Box::new(task), Vec::new(), Box::new(Blank), Region::default())
    }

    #[test]
    fn test_insert_rejects_occupied_chamber() {
        let registry = ChamberRegistry::new();
        registry.insert(entry(1)).unwrap();
        assert!(matches!(
            registry.insert(entry(1)),
            Err(RuntimeError::ChamberOccupied(id)) if id == ChamberId::new(1)
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_survives_delete() {
        let registry = ChamberRegistry::new();
        registry.insert(entry(2)).unwrap();
        registry.insert(entry(0)).unwrap();
        let snapshot = registry.snapshot();
        registry.delete(ChamberId::new(0));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].chamber, ChamberId::new(0));
        assert_eq!(registry.ids(), vec![ChamberId::new(2)]);
        assert!(matches!(
            registry.require(ChamberId::new(0)),
            Err(RuntimeError::UnknownChamber(_))
        ));
    }

    #[test]
    fn test_buffer_swap_keeps_order() {
        let buffer = EventBuffer::new();
        let ev = |ms| Event::state("S", TaskTime::from_millis(ms), Metadata::new());
        buffer.append(vec![ev(1), ev(2)]);
        buffer.append(vec![ev(3)]);
        let first = buffer.swap();
        assert!(buffer.is_empty());
        buffer.append(vec![ev(4)]);
        let times: Vec<_> = first
            .iter()
            .chain(buffer.swap().iter())
            .map(|e| e.time)
            .collect();
        assert_eq!(
            times,
            vec![1, 2, 3, 4]
                .into_iter()
                .map(TaskTime::from_millis)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_notifier_wakes_waiter() {
        let notifier = Arc::new(EventNotifier::new());
        let waiter = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || notifier.wait())
        };
        thread::sleep(Duration::from_millis(5));
        notifier.notify();
        waiter.join().unwrap();
        assert!(!notifier.is_set());
    }

    #[test]
    fn test_notifier_wait_for_times_out() {
        let notifier = EventNotifier::new();
        assert!(!notifier.wait_for(Duration::from_millis(5)));
        notifier.notify();
        notifier.notify();
        assert!(notifier.wait_for(Duration::from_millis(5)));
        assert!(!notifier.is_set());
    }
}
