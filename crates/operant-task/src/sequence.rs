//! Task sequences
//!
//! A sequence is a task whose states are phases. It holds exactly one live
//! sub-task (the delegate) and forwards every tick to it. When the delegate
//! completes, the sequence stops it, builds the next phase's sub-task with the
//! same components and metadata, and swaps it in.

use operant_core::{Components, Event, Metadata, TaskMetadata, Timestamp};

use crate::{StateMachine, Task, TaskContext, TaskResult, TaskSnapshot, TaskState};

/// Phase layout of a sequence
pub trait SequenceLogic: Send + 'static {
    type Phase: TaskState;

    /// Build the sub-task that runs during `phase`
    fn build_phase(&self, phase: Self::Phase, ctx: &TaskContext) -> TaskResult<Box<dyn Task>>;

    /// Phase following `phase`; `None` when `phase` is the last one
    fn next_phase(&self, phase: Self::Phase) -> Option<Self::Phase>;
}

/// Delegate holder running one sub-task per phase
pub struct TaskSequence<Q: SequenceLogic> {
    name: &'static str,
    logic: Q,
    machine: StateMachine<Q::Phase>,
    delegate: Box<dyn Task>,
    context: TaskContext,
}

impl<Q: SequenceLogic> TaskSequence<Q> {
    pub fn new(
        name: &'static str,
        logic: Q,
        first: Q::Phase,
        context: TaskContext,
    ) -> TaskResult<Self> {
        let delegate = logic.build_phase(first, &context)?;
        Ok(TaskSequence {
            name,
            logic,
            machine: StateMachine::new(first, context.metadata.clone(), context.now),
            delegate,
            context,
        })
    }

    pub fn phase(&self) -> Q::Phase {
        self.machine.state()
    }

    pub fn delegate(&self) -> &dyn Task {
        self.delegate.as_ref()
    }

    /// Move the delegate's events behind the ones already buffered
    fn collect_delegate_events(&mut self) {
        if self.delegate.has_events() {
            let events = self.delegate.take_events();
            self.machine.extend_events(events);
        }
    }

    /// Replace the finished delegate with the sub-task for `next`
    fn switch_task(&mut self, next: Q::Phase, now: Timestamp) -> TaskResult<()> {
        self.delegate.stop(now)?;
        self.collect_delegate_events();

        let ctx = TaskContext {
            now,
            ..self.context.clone()
        };
        let mut replacement = self.logic.build_phase(next, &ctx)?;
        replacement.start(now)?;

        let previous = std::mem::replace(&mut self.delegate, replacement);
        self.machine.change_state(next, Metadata::new());
        self.collect_delegate_events();

        tracing::info!(
            chamber = self.context.metadata.chamber.index(),
            sequence = self.name,
            from = previous.name(),
            to = self.delegate.name(),
            phase = next.name(),
            "sequence switched task"
        );
        Ok(())
    }
}

impl<Q: SequenceLogic> Task for TaskSequence<Q> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, now: Timestamp) -> TaskResult<()> {
        self.machine.start(now);
        let result = self.delegate.start(now);
        self.collect_delegate_events();
        result
    }

    fn stop(&mut self, now: Timestamp) -> TaskResult<()> {
        let result = if self.delegate.is_started() {
            self.delegate.stop(now)
        } else {
            Ok(())
        };
        self.collect_delegate_events();
        self.machine.stop(now);
        result
    }

    fn pause(&mut self, now: Timestamp) {
        self.machine.advance(now);
        self.machine.set_paused(true);
        self.delegate.pause(now);
    }

    fn resume(&mut self, now: Timestamp) {
        self.machine.advance(now);
        self.machine.set_paused(false);
        self.delegate.resume(now);
    }

    fn evaluate(&mut self, now: Timestamp) -> TaskResult<()> {
        if !self.machine.is_started() || self.machine.is_paused() {
            return Ok(());
        }
        self.machine.advance(now);
        self.delegate.evaluate(now)?;
        self.collect_delegate_events();

        if self.delegate.is_complete() {
            if let Some(next) = self.logic.next_phase(self.machine.state()) {
                self.switch_task(next, now)?;
            }
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.logic.next_phase(self.machine.state()).is_none() && self.delegate.is_complete()
    }

    fn is_started(&self) -> bool {
        self.machine.is_started()
    }

    fn is_paused(&self) -> bool {
        self.machine.is_paused()
    }

    fn has_events(&self) -> bool {
        self.machine.has_events() || self.delegate.has_events()
    }

    fn take_events(&mut self) -> Vec<Event> {
        self.collect_delegate_events();
        self.machine.take_events()
    }

    fn snapshot(&self) -> TaskSnapshot {
        let inner = self.delegate.snapshot();
        TaskSnapshot {
            task: self.name,
            phase: Some(self.machine.state().name()),
            started: self.machine.is_started(),
            paused: self.machine.is_paused(),
            complete: self.is_complete(),
            elapsed: self.machine.elapsed(),
            ..inner
        }
    }

    fn metadata(&self) -> &TaskMetadata {
        self.machine.metadata()
    }

    fn components(&self) -> &Components {
        &self.context.components
    }
}
