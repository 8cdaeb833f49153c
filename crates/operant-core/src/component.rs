//! Hardware capability contract
//!
//! Components are the handles a task uses to observe and drive its chamber.
//! Every operation is non-blocking; implementations live outside the engine
//! and are bound to tasks through a [`Components`] set.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Result of polling a binary input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputChange {
    NoChange,
    Entered,
    Exited,
}

impl fmt::Display for InputChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputChange::NoChange => "no_change",
            InputChange::Entered => "entered",
            InputChange::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Capability classes a component can provide
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    BinaryInput,
    Toggle,
    TimedToggle,
    ByteOutput,
    Stimmer,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::BinaryInput => "binary_input",
            ComponentKind::Toggle => "toggle",
            ComponentKind::TimedToggle => "timed_toggle",
            ComponentKind::ByteOutput => "byte_output",
            ComponentKind::Stimmer => "stimmer",
        };
        f.write_str(s)
    }
}

/// Behavior shared by every component
pub trait Component: Send + Sync {
    /// Identifier within the chamber (e.g. "food_trough")
    fn id(&self) -> &str;

    /// Release the underlying hardware
    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Input reporting entered/exited transitions (nose pokes, beam breaks)
pub trait BinaryInput: Component {
    fn poll(&self) -> InputChange;
}

/// On/off output (lights, fans)
pub trait Toggle: Component {
    fn toggle(&self, on: bool) -> CoreResult<()>;
    fn is_on(&self) -> bool;
}

/// Output that switches on for a fixed duration (pellet dispensers)
pub trait TimedToggle: Component {
    fn toggle_for(&self, duration: Duration) -> CoreResult<()>;
}

/// Output writing a single byte to its source
pub trait ByteOutput: Component {
    fn send(&self, value: u8) -> CoreResult<()>;
    fn last_sent(&self) -> u8;
}

/// Stimulation pulse train parameters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StimParams {
    /// Parameter slot
    pub slot: u32,
    /// Output channels the train drives
    pub outputs: Vec<u32>,
    /// Train period (μs)
    pub period: u32,
    /// Train duration (μs)
    pub duration: u32,
    /// Amplitude per output per phase
    pub amplitudes: Vec<Vec<f64>>,
    /// Duration per phase (μs)
    pub phase_durations: Vec<u32>,
}

/// Electrical stimulator
pub trait Stimmer: Component {
    fn parametrize(&self, params: &StimParams) -> CoreResult<()>;
    fn start(&self, slot: u32, stim_type: &str) -> CoreResult<()>;
}

/// Type-erased handle to one bound component
#[derive(Clone)]
pub enum ComponentHandle {
    BinaryInput(Arc<dyn BinaryInput>),
    Toggle(Arc<dyn Toggle>),
    TimedToggle(Arc<dyn TimedToggle>),
    ByteOutput(Arc<dyn ByteOutput>),
    Stimmer(Arc<dyn Stimmer>),
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentHandle::BinaryInput(_) => ComponentKind::BinaryInput,
            ComponentHandle::Toggle(_) => ComponentKind::Toggle,
            ComponentHandle::TimedToggle(_) => ComponentKind::TimedToggle,
            ComponentHandle::ByteOutput(_) => ComponentKind::ByteOutput,
            ComponentHandle::Stimmer(_) => ComponentKind::Stimmer,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ComponentHandle::BinaryInput(c) => c.id(),
            ComponentHandle::Toggle(c) => c.id(),
            ComponentHandle::TimedToggle(c) => c.id(),
            ComponentHandle::ByteOutput(c) => c.id(),
            ComponentHandle::Stimmer(c) => c.id(),
        }
    }

    pub fn close(&self) -> CoreResult<()> {
        match self {
            ComponentHandle::BinaryInput(c) => c.close(),
            ComponentHandle::Toggle(c) => c.close(),
            ComponentHandle::TimedToggle(c) => c.close(),
            ComponentHandle::ByteOutput(c) => c.close(),
            ComponentHandle::Stimmer(c) => c.close(),
        }
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.id())
    }
}

/// Components bound to one chamber, keyed by id
///
/// Cloning is cheap: handles are shared, so a task sequence can pass the same
/// set to each of its phases.
#[derive(Clone, Debug, Default)]
pub struct Components {
    handles: BTreeMap<String, ComponentHandle>,
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $trait:ident) => {
        pub fn $name(&self, id: &str) -> CoreResult<Arc<dyn $trait>> {
            match self.get(id)? {
                ComponentHandle::$variant(c) => Ok(Arc::clone(c)),
                other => Err(CoreError::ComponentKindMismatch {
                    id: id.to_string(),
                    expected: ComponentKind::$variant,
                    actual: other.kind(),
                }),
            }
        }
    };
}

impl Components {
    pub fn new() -> Self {
        Components {
            handles: BTreeMap::new(),
        }
    }

    /// Bind a handle under its own id, replacing any previous binding
    pub fn insert(&mut self, handle: ComponentHandle) {
        self.handles.insert(handle.id().to_string(), handle);
    }

    pub fn with(mut self, handle: ComponentHandle) -> Self {
        self.insert(handle);
        self
    }

    pub fn get(&self, id: &str) -> CoreResult<&ComponentHandle> {
        self.handles
            .get(id)
            .ok_or_else(|| CoreError::ComponentNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    typed_getter!(binary_input, BinaryInput, BinaryInput);
    typed_getter!(toggle, Toggle, Toggle);
    typed_getter!(timed_toggle, TimedToggle, TimedToggle);
    typed_getter!(byte_output, ByteOutput, ByteOutput);
    typed_getter!(stimmer, Stimmer, Stimmer);

    /// Check that every declared component is bound with the declared kind
    pub fn verify(&self, required: &[(&str, ComponentKind)]) -> CoreResult<()> {
        for (id, kind) in required {
            let handle = self.get(id)?;
            if handle.kind() != *kind {
                return Err(CoreError::ComponentKindMismatch {
                    id: (*id).to_string(),
                    expected: *kind,
                    actual: handle.kind(),
                });
            }
        }
        Ok(())
    }

    /// Close every handle, returning the failures
    pub fn close_all(&self) -> Vec<CoreError> {
        self.handles
            .values()
            .filter_map(|handle| handle.close().err())
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmptySource, Source};

    fn bound(kinds: &[(&str, ComponentKind)]) -> Components {
        let source = EmptySource::new("es");
        let mut components = Components::new();
        for (id, kind) in kinds {
            components.insert(source.bind(id, *kind, None).unwrap());
        }
        components
    }

    #[test]
    fn test_typed_getters() {
        let components = bound(&[
            ("trough", ComponentKind::BinaryInput),
            ("house_light", ComponentKind::Toggle),
        ]);
        assert!(components.binary_input("trough").is_ok());
        assert!(components.toggle("house_light").is_ok());
        assert!(matches!(
            components.toggle("trough"),
            Err(CoreError::ComponentKindMismatch { .. })
        ));
        assert!(matches!(
            components.toggle("missing"),
            Err(CoreError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn test_verify_declarations() {
        let components = bound(&[("food", ComponentKind::TimedToggle)]);
        assert!(components
            .verify(&[("food", ComponentKind::TimedToggle)])
            .is_ok());
        assert!(components.verify(&[("food", ComponentKind::Toggle)]).is_err());
        assert!(components
            .verify(&[("fan", ComponentKind::Toggle)])
            .is_err());
    }

    #[test]
    fn test_clone_shares_handles() {
        let components = bound(&[("light", ComponentKind::Toggle)]);
        let shared = components.clone();
        components.toggle("light").unwrap().toggle(true).unwrap();
        assert!(shared.toggle("light").unwrap().is_on());
    }
}
