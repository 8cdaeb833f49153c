//! The task interface driven by the scheduler

use std::time::Duration;

use operant_core::{ChamberId, Components, Event, TaskMetadata, Timestamp};

use crate::{StateMachine, TaskResult, TaskState};

/// Read-only view of a task for presentation
#[derive(Clone, Debug, PartialEq)]
pub struct TaskSnapshot {
    pub task: &'static str,
    pub chamber: ChamberId,
    pub subject: String,
    /// Active phase, for task sequences
    pub phase: Option<&'static str>,
    pub state: &'static str,
    pub time_in_state: Duration,
    pub elapsed: Duration,
    pub started: bool,
    pub paused: bool,
    pub complete: bool,
    /// Task-specific counters (trial number, rewards, ...)
    pub details: Vec<(&'static str, String)>,
}

/// A running task instance, as seen by the engine
///
/// `evaluate` is called once per logic tick while the task is started and not
/// paused. All methods run on whichever thread holds the chamber's task lock,
/// so implementations need `Send` but not `Sync`.
pub trait Task: Send {
    /// Registered task name
    fn name(&self) -> &'static str;

    fn start(&mut self, now: Timestamp) -> TaskResult<()>;

    fn stop(&mut self, now: Timestamp) -> TaskResult<()>;

    fn pause(&mut self, now: Timestamp);

    fn resume(&mut self, now: Timestamp);

    /// Advance the task to `now`: poll inputs, emit events, maybe change state
    fn evaluate(&mut self, now: Timestamp) -> TaskResult<()>;

    /// Pure completion predicate, polled after every tick
    fn is_complete(&self) -> bool;

    fn is_started(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn has_events(&self) -> bool;

    /// Hand over buffered events in production order
    fn take_events(&mut self) -> Vec<Event>;

    fn snapshot(&self) -> TaskSnapshot;

    fn metadata(&self) -> &TaskMetadata;

    fn components(&self) -> &Components;
}

/// Protocol logic layered on a [`StateMachine`]
pub trait TaskLogic: Send + 'static {
    type State: TaskState;

    /// Hook run when the task starts (turn lights on, ...)
    fn on_start(&mut self, _machine: &mut StateMachine<Self::State>) -> TaskResult<()> {
        Ok(())
    }

    /// Hook run when the task stops (turn everything off, ...)
    fn on_stop(&mut self, _machine: &mut StateMachine<Self::State>) -> TaskResult<()> {
        Ok(())
    }

    /// One evaluation tick; `machine.cur_time()` is already advanced
    fn step(&mut self, machine: &mut StateMachine<Self::State>) -> TaskResult<()>;

    fn is_complete(&self, machine: &StateMachine<Self::State>) -> bool;

    fn details(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// A [`TaskLogic`] bound to its state machine and components
pub struct TaskInstance<L: TaskLogic> {
    name: &'static str,
    logic: L,
    machine: StateMachine<L::State>,
    components: Components,
}

impl<L: TaskLogic> TaskInstance<L> {
    pub fn new(
        name: &'static str,
        logic: L,
        initial: L::State,
        metadata: TaskMetadata,
        components: Components,
        now: Timestamp,
    ) -> Self {
        TaskInstance {
            name,
            logic,
            machine: StateMachine::new(initial, metadata, now),
            components,
        }
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    pub fn machine(&self) -> &StateMachine<L::State> {
        &self.machine
    }
}

impl<L: TaskLogic> Task for TaskInstance<L> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, now: Timestamp) -> TaskResult<()> {
        self.machine.start(now);
        self.logic.on_start(&mut self.machine)
    }

    fn stop(&mut self, now: Timestamp) -> TaskResult<()> {
        self.machine.advance(now);
        let result = self.logic.on_stop(&mut self.machine);
        self.machine.stop(now);
        result
    }

    fn pause(&mut self, now: Timestamp) {
        self.machine.advance(now);
        self.machine.set_paused(true);
    }

    fn resume(&mut self, now: Timestamp) {
        self.machine.advance(now);
        self.machine.set_paused(false);
    }

    fn evaluate(&mut self, now: Timestamp) -> TaskResult<()> {
        if !self.machine.is_started() || self.machine.is_paused() {
            return Ok(());
        }
        self.machine.advance(now);
        self.logic.step(&mut self.machine)
    }

    fn is_complete(&self) -> bool {
        self.logic.is_complete(&self.machine)
    }

    fn is_started(&self) -> bool {
        self.machine.is_started()
    }

    fn is_paused(&self) -> bool {
        self.machine.is_paused()
    }

    fn has_events(&self) -> bool {
        self.machine.has_events()
    }

    fn take_events(&mut self) -> Vec<Event> {
        self.machine.take_events()
    }

    fn snapshot(&self) -> TaskSnapshot {
        let md = self.machine.metadata();
        TaskSnapshot {
            task: self.name,
            chamber: md.chamber,
            subject: md.subject.clone(),
            phase: None,
            state: self.machine.state().name(),
            time_in_state: self.machine.time_in_state(),
            elapsed: self.machine.elapsed(),
            started: self.machine.is_started(),
            paused: self.machine.is_paused(),
            complete: self.is_complete(),
            details: self.logic.details(),
        }
    }

    fn metadata(&self) -> &TaskMetadata {
        self.machine.metadata()
    }

    fn components(&self) -> &Components {
        &self.components
    }
}
