//! Simulated components

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use operant_core::{
    BinaryInput, ByteOutput, Component, ComponentHandle, ComponentKind, CoreError, CoreResult,
    InputChange, Source, StimParams, Stimmer, TimedToggle, Toggle,
};
use parking_lot::Mutex;

// ============================================================================
// SCRIPTED INPUT
// ============================================================================

/// Binary input reporting queued changes, one per poll
pub struct ScriptedInput {
    id: String,
    pending: Mutex<VecDeque<InputChange>>,
    closed: Mutex<bool>,
}

impl ScriptedInput {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(ScriptedInput {
            id: id.into(),
            pending: Mutex::new(VecDeque::new()),
            closed: Mutex::new(false),
        })
    }

    pub fn push(&self, change: InputChange) {
        self.pending.lock().push_back(change);
    }

    /// Queue an enter followed by an exit
    pub fn poke(&self) {
        let mut pending = self.pending.lock();
        pending.push_back(InputChange::Entered);
        pending.push_back(InputChange::Exited);
    }

    pub fn enter(&self) {
        self.push(InputChange::Entered);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl Component for ScriptedInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn close(&self) -> CoreResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

impl BinaryInput for ScriptedInput {
    fn poll(&self) -> InputChange {
        self.pending
            .lock()
            .pop_front()
            .unwrap_or(InputChange::NoChange)
    }
}

// ============================================================================
// RECORDING OUTPUTS
// ============================================================================

/// Output component remembering everything it was told
pub struct RecordingToggle {
    id: String,
    history: Mutex<Vec<bool>>,
    pulses: Mutex<Vec<Duration>>,
    bytes: Mutex<Vec<u8>>,
    closed: Mutex<bool>,
}

impl RecordingToggle {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(RecordingToggle {
            id: id.into(),
            history: Mutex::new(Vec::new()),
            pulses: Mutex::new(Vec::new()),
            bytes: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        })
    }

    /// Every on/off command, oldest first
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().clone()
    }

    /// Every timed pulse
    pub fn pulses(&self) -> Vec<Duration> {
        self.pulses.lock().clone()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl Component for RecordingToggle {
    fn id(&self) -> &str {
        &self.id
    }

    fn close(&self) -> CoreResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

impl Toggle for RecordingToggle {
    fn toggle(&self, on: bool) -> CoreResult<()> {
        self.history.lock().push(on);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.history.lock().last().copied().unwrap_or(false)
    }
}

impl TimedToggle for RecordingToggle {
    fn toggle_for(&self, duration: Duration) -> CoreResult<()> {
        self.pulses.lock().push(duration);
        Ok(())
    }
}

impl ByteOutput for RecordingToggle {
    fn send(&self, value: u8) -> CoreResult<()> {
        self.bytes.lock().push(value);
        Ok(())
    }

    fn last_sent(&self) -> u8 {
        self.bytes.lock().last().copied().unwrap_or(0)
    }
}

// ============================================================================
// SIMULATED SOURCE
// ============================================================================

#[derive(Default)]
struct Bound {
    inputs: BTreeMap<String, Arc<ScriptedInput>>,
    outputs: BTreeMap<String, Arc<RecordingToggle>>,
}

/// Source handing out scripted inputs and recording outputs
///
/// Components are keyed by `address` when one is given, else by id, so two
/// chambers can bind the same component id to different simulated devices.
/// Clones share the bound components.
#[derive(Clone)]
pub struct SimSource {
    name: String,
    bound: Arc<Mutex<Bound>>,
    closed: Arc<Mutex<bool>>,
}

impl SimSource {
    pub fn new(name: impl Into<String>) -> Self {
        SimSource {
            name: name.into(),
            bound: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub fn input(&self, key: &str) -> Option<Arc<ScriptedInput>> {
        self.bound.lock().inputs.get(key).cloned()
    }

    pub fn output(&self, key: &str) -> Option<Arc<RecordingToggle>> {
        self.bound.lock().outputs.get(key).cloned()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl Source for SimSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(
        &self,
        id: &str,
        kind: ComponentKind,
        address: Option<&str>,
    ) -> CoreResult<ComponentHandle> {
        let key = address.unwrap_or(id).to_string();
        let mut bound = self.bound.lock();
        Ok(match kind {
            ComponentKind::BinaryInput => {
                let input = Arc::clone(
                    bound
                        .inputs
                        .entry(key)
                        .or_insert_with(|| ScriptedInput::new(id)),
                );
                ComponentHandle::BinaryInput(input)
            }
            ComponentKind::Toggle | ComponentKind::TimedToggle | ComponentKind::ByteOutput => {
                let output = Arc::clone(
                    bound
                        .outputs
                        .entry(key)
                        .or_insert_with(|| RecordingToggle::new(id)),
                );
                match kind {
                    ComponentKind::Toggle => ComponentHandle::Toggle(output),
                    ComponentKind::TimedToggle => ComponentHandle::TimedToggle(output),
                    _ => ComponentHandle::ByteOutput(output),
                }
            }
            ComponentKind::Stimmer => {
                return Err(CoreError::UnsupportedComponent {
                    source_name: self.name.clone(),
                    kind,
                })
            }
        })
    }

    fn close_source(&self) -> CoreResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// A stimulator that records its parametrizations and starts
#[derive(Default)]
pub struct RecordingStimmer {
    pub params: Mutex<Vec<StimParams>>,
    pub starts: Mutex<Vec<(u32, String)>>,
}

impl Component for RecordingStimmer {
    fn id(&self) -> &str {
        "stim"
    }
}

impl Stimmer for RecordingStimmer {
    fn parametrize(&self, params: &StimParams) -> CoreResult<()> {
        self.params.lock().push(params.clone());
        Ok(())
    }

    fn start(&self, slot: u32, stim_type: &str) -> CoreResult<()> {
        self.starts.lock().push((slot, stim_type.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_drains_in_order() {
        let input = ScriptedInput::new("np1");
        input.poke();
        assert_eq!(input.poll(), InputChange::Entered);
        assert_eq!(input.poll(), InputChange::Exited);
        assert_eq!(input.poll(), InputChange::NoChange);
    }

    #[test]
    fn test_sim_source_shares_by_address() {
        let source = SimSource::new("sim");
        let a = source.bind("np1", ComponentKind::BinaryInput, Some("c0/np1")).unwrap();
        source.bind("np1", ComponentKind::BinaryInput, Some("c1/np1")).unwrap();
        source.input("c0/np1").unwrap().enter();
        match a {
            ComponentHandle::BinaryInput(input) => assert_eq!(input.poll(), InputChange::Entered),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(source.input("c1/np1").unwrap().pending(), 0);
    }

    #[test]
    fn test_recording_toggle_history() {
        let source = SimSource::new("sim");
        let handle = source.bind("light", ComponentKind::Toggle, None).unwrap();
        if let ComponentHandle::Toggle(light) = handle {
            light.toggle(true).unwrap();
            light.toggle(false).unwrap();
            assert!(!light.is_on());
        }
        assert_eq!(source.output("light").unwrap().history(), vec![true, false]);
    }

    #[test]
    fn test_sim_source_rejects_stimmer() {
        let source = SimSource::new("sim");
        assert!(source.bind("stim", ComponentKind::Stimmer, None).is_err());
    }
}
