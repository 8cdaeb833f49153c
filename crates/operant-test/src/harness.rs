//! Step-by-step engine harness
//!
//! Runs the three engine loops by hand against a [`ManualClock`], so tests can
//! interleave clock moves, input pokes and loop passes deterministically.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use operant_core::{ChamberId, Components, EventLogger, Source, TaskMetadata};
use operant_runtime::{
    ChamberLayout, ChamberNotice, ChamberSetup, EventDispatcher, LifecycleManager, LogicScheduler,
    NoticeSink, PresentationLoop, RuntimeResult,
};
use operant_task::Protocol;
use operant_time::ManualClock;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    test_registry, PresentationLog, RecordingLog, RecordingLogger, RecordingPresentation,
    ScriptedInput, ScriptedOperatorInput, SimSource,
};

/// What a test observes of one added chamber
#[derive(Clone, Debug)]
pub struct ChamberProbe {
    pub chamber: ChamberId,
    pub log: RecordingLog,
    pub frames: PresentationLog,
}

pub struct Harness {
    pub manager: LifecycleManager,
    pub clock: ManualClock,
    pub source: SimSource,
    pub operator: ScriptedOperatorInput,
    logic: LogicScheduler,
    dispatcher: EventDispatcher,
    render: PresentationLoop,
    notices: UnboundedReceiver<ChamberNotice>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        let (sink, notices) = NoticeSink::channel();
        let manager = LifecycleManager::new(
            test_registry(),
            Arc::new(clock.clone()),
            ChamberLayout::compute(1280, 720, 4),
            sink,
        );
        let operator = ScriptedOperatorInput::new();
        Harness {
            logic: LogicScheduler::new(manager.clone(), Box::new(operator.clone()), 500.0),
            dispatcher: EventDispatcher::new(manager.clone()),
            render: PresentationLoop::new(manager.clone(), 30.0),
            manager,
            clock,
            source: SimSource::new("sim"),
            operator,
            notices,
        }
    }

    fn address(chamber: u32, id: &str) -> String {
        format!("c{chamber}/{id}")
    }

    /// Add `task` to `chamber` with a recording logger and presentation
    pub fn add(&self, chamber: u32, task: &str, protocol: Protocol) -> RuntimeResult<ChamberProbe> {
        self.add_with(chamber, task, protocol, Vec::new())
    }

    /// Like [`Harness::add`], with extra loggers registered after the recorder
    pub fn add_with(
        &self,
        chamber: u32,
        task: &str,
        protocol: Protocol,
        extra_loggers: Vec<Box<dyn EventLogger>>,
    ) -> RuntimeResult<ChamberProbe> {
        let mut components = Components::new();
        for (id, kind) in self.manager.tasks().components(task)? {
            let address = Self::address(chamber, id);
            components.insert(self.source.bind(id, *kind, Some(&address))?);
        }

        let (recorder, log) = RecordingLogger::new(format!("recorder-{chamber}"));
        let mut loggers: Vec<Box<dyn EventLogger>> = vec![Box::new(recorder)];
        loggers.extend(extra_loggers);
        let (presentation, frames) = RecordingPresentation::new();

        let id = ChamberId(chamber);
        self.manager.add(ChamberSetup {
            chamber: id,
            task: task.to_string(),
            metadata: TaskMetadata::new(id, format!("rat{chamber:02}")),
            protocol,
            components,
            loggers,
            presentation: Box::new(presentation),
        })?;
        Ok(ChamberProbe {
            chamber: id,
            log,
            frames,
        })
    }

    /// Simulated input `id` of `chamber`
    ///
    /// Panics if the chamber's task has no such input.
    pub fn input(&self, chamber: u32, id: &str) -> Arc<ScriptedInput> {
        self.source
            .input(&Self::address(chamber, id))
            .unwrap_or_else(|| panic!("chamber {chamber} has no input {id}"))
    }

    /// Advance the clock by `dt`, then run one pass of every loop
    pub fn step(&mut self, dt: Duration) {
        self.clock.advance(dt);
        self.pass();
    }

    /// One pass of logic, dispatch and presentation at the current time
    pub fn pass(&mut self) {
        self.logic.pass();
        self.dispatcher.pass();
        self.render.pass();
    }

    /// Step `ticks` times by `dt`
    pub fn run(&mut self, ticks: u32, dt: Duration) {
        for _ in 0..ticks {
            self.step(dt);
        }
    }

    /// Remove `chamber`, driving the loops until the removal worker is done
    pub fn remove(&mut self, chamber: u32, close_loggers: bool) -> RuntimeResult<()> {
        let handle = self.manager.remove(ChamberId(chamber), close_loggers)?;
        while !handle.is_finished() {
            self.pass();
            thread::sleep(Duration::from_millis(1));
        }
        handle.join()
    }

    pub fn dispatched_batches(&self) -> u64 {
        self.dispatcher.batches()
    }

    /// Notices sent since the last call
    pub fn notices(&mut self) -> Vec<ChamberNotice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_binds_per_chamber_inputs() {
        let harness = Harness::new();
        harness.add(0, "Trial", Protocol::new()).unwrap();
        harness.add(1, "Trial", Protocol::new()).unwrap();
        harness.input(0, crate::POKE).enter();
        assert_eq!(harness.input(0, crate::POKE).pending(), 1);
        assert_eq!(harness.input(1, crate::POKE).pending(), 0);
    }

    #[test]
    fn test_step_moves_clock() {
        let mut harness = Harness::new();
        harness.run(3, Duration::from_millis(2));
        assert_eq!(harness.manager.clock().now().as_micros(), 6_000);
    }
}
