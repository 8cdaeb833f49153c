//! Recording presentation and scripted operator input

use std::collections::VecDeque;
use std::sync::Arc;

use operant_runtime::{Frame, OperatorEvent, OperatorInput, Presentation, RuntimeResult};
use operant_task::TaskSnapshot;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Drawn {
    frames: u64,
    last: Option<TaskSnapshot>,
    inputs: Vec<OperatorEvent>,
}

/// Read side of a [`RecordingPresentation`]
#[derive(Clone, Debug, Default)]
pub struct PresentationLog {
    inner: Arc<Mutex<Drawn>>,
}

impl PresentationLog {
    pub fn frames(&self) -> u64 {
        self.inner.lock().frames
    }

    pub fn last_snapshot(&self) -> Option<TaskSnapshot> {
        self.inner.lock().last.clone()
    }

    /// Operator events handed to the presentation, oldest first
    pub fn inputs(&self) -> Vec<OperatorEvent> {
        self.inner.lock().inputs.clone()
    }
}

/// Presentation that records what it was asked to draw
pub struct RecordingPresentation {
    log: PresentationLog,
}

impl RecordingPresentation {
    pub fn new() -> (Self, PresentationLog) {
        let log = PresentationLog::default();
        (RecordingPresentation { log: log.clone() }, log)
    }
}

impl Presentation for RecordingPresentation {
    fn draw(&mut self, frame: &Frame) -> RuntimeResult<()> {
        let mut drawn = self.log.inner.lock();
        drawn.frames += 1;
        drawn.last = Some(frame.snapshot.clone());
        Ok(())
    }

    fn handle_input(&mut self, events: &[OperatorEvent]) {
        self.log.inner.lock().inputs.extend_from_slice(events);
    }
}

/// Presentation that panics on every frame and every operator event
pub struct PanickingPresentation;

impl Presentation for PanickingPresentation {
    fn draw(&mut self, frame: &Frame) -> RuntimeResult<()> {
        panic!("cannot draw frame {}", frame.number);
    }

    fn handle_input(&mut self, _events: &[OperatorEvent]) {
        panic!("cannot handle operator input");
    }
}

/// Operator input replaying queued batches, one batch per poll
///
/// Clones share the queue, so a test keeps one clone and hands the other to
/// the logic scheduler.
#[derive(Clone, Debug, Default)]
pub struct ScriptedOperatorInput {
    queue: Arc<Mutex<VecDeque<Vec<OperatorEvent>>>>,
}

impl ScriptedOperatorInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, batch: Vec<OperatorEvent>) {
        self.queue.lock().push_back(batch);
    }

    pub fn key(&self, key: char) {
        self.push(vec![OperatorEvent::Key(key)]);
    }
}

impl OperatorInput for ScriptedOperatorInput {
    fn poll(&mut self) -> Vec<OperatorEvent> {
        self.queue.lock().pop_front().unwrap_or_default()
    }
}
