//! Recording, failing and panicking event loggers

use std::sync::Arc;

use operant_core::{CoreError, CoreResult, Event, EventLogger};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<Vec<Event>>,
    starts: u32,
    closes: u32,
}

/// Read side of a [`RecordingLogger`], kept by the test
#[derive(Clone, Debug, Default)]
pub struct RecordingLog {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingLog {
    /// Every logged event, flattened in delivery order
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().batches.iter().flatten().cloned().collect()
    }

    /// Event labels in delivery order (`INITIATION`, `poke:entered`, ...)
    pub fn labels(&self) -> Vec<String> {
        self.events().iter().map(Event::label).collect()
    }

    pub fn batches(&self) -> usize {
        self.inner.lock().batches.len()
    }

    pub fn starts(&self) -> u32 {
        self.inner.lock().starts
    }

    pub fn closes(&self) -> u32 {
        self.inner.lock().closes
    }
}

/// Logger that keeps every batch in memory
pub struct RecordingLogger {
    name: String,
    started: bool,
    log: RecordingLog,
}

impl RecordingLogger {
    pub fn new(name: impl Into<String>) -> (Self, RecordingLog) {
        let log = RecordingLog::default();
        let logger = RecordingLogger {
            name: name.into(),
            started: false,
            log: log.clone(),
        };
        (logger, log)
    }
}

impl EventLogger for RecordingLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> CoreResult<()> {
        self.started = true;
        self.log.inner.lock().starts += 1;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn log_events(&mut self, events: &[Event]) -> CoreResult<()> {
        if !self.started {
            return Err(CoreError::LoggerNotStarted(self.name.clone()));
        }
        self.log.inner.lock().batches.push(events.to_vec());
        Ok(())
    }

    fn close(&mut self) -> CoreResult<()> {
        self.started = false;
        self.log.inner.lock().closes += 1;
        Ok(())
    }
}

/// Logger that starts but fails every write
pub struct FailingLogger {
    name: String,
    started: bool,
}

impl FailingLogger {
    pub fn new(name: impl Into<String>) -> Self {
        FailingLogger {
            name: name.into(),
            started: false,
        }
    }
}

impl EventLogger for FailingLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> CoreResult<()> {
        self.started = true;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn log_events(&mut self, _events: &[Event]) -> CoreResult<()> {
        Err(CoreError::LoggerFailed {
            logger: self.name.clone(),
            reason: "disk full".to_string(),
        })
    }

    fn close(&mut self) -> CoreResult<()> {
        self.started = false;
        Ok(())
    }
}

/// Logger that starts, then panics on every write and on close
pub struct PanickingLogger {
    name: String,
    started: bool,
}

impl PanickingLogger {
    pub fn new(name: impl Into<String>) -> Self {
        PanickingLogger {
            name: name.into(),
            started: false,
        }
    }
}

impl EventLogger for PanickingLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> CoreResult<()> {
        self.started = true;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn log_events(&mut self, events: &[Event]) -> CoreResult<()> {
        panic!("{} tripped on a batch of {}", self.name, events.len());
    }

    fn close(&mut self) -> CoreResult<()> {
        panic!("{} tripped on close", self.name);
    }
}
