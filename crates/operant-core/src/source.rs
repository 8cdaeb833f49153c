//! Component sources
//!
//! A source is the driver behind a group of components (a DAQ board, a serial
//! device, a simulator). The engine only binds components through it and closes
//! it on shutdown, after every chamber using it has been removed.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    BinaryInput, ByteOutput, Component, ComponentHandle, ComponentKind, CoreResult, InputChange,
    StimParams, Stimmer, TimedToggle, Toggle,
};

/// Driver that produces component handles
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Create a handle for component `id` of the given kind
    fn bind(&self, id: &str, kind: ComponentKind, address: Option<&str>)
        -> CoreResult<ComponentHandle>;

    /// Release the driver; called once at shutdown
    fn close_source(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Source used when no hardware is attached
///
/// Inputs never change; outputs only remember their last value.
pub struct EmptySource {
    name: String,
}

impl EmptySource {
    pub fn new(name: impl Into<String>) -> Self {
        EmptySource { name: name.into() }
    }
}

impl Default for EmptySource {
    fn default() -> Self {
        Self::new("es")
    }
}

impl Source for EmptySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(
        &self,
        id: &str,
        kind: ComponentKind,
        _address: Option<&str>,
    ) -> CoreResult<ComponentHandle> {
        let component = Arc::new(EmptyComponent::new(id));
        Ok(match kind {
            ComponentKind::BinaryInput => ComponentHandle::BinaryInput(component),
            ComponentKind::Toggle => ComponentHandle::Toggle(component),
            ComponentKind::TimedToggle => ComponentHandle::TimedToggle(component),
            ComponentKind::ByteOutput => ComponentHandle::ByteOutput(component),
            ComponentKind::Stimmer => ComponentHandle::Stimmer(component),
        })
    }
}

/// Component that accepts every capability and does nothing
pub struct EmptyComponent {
    id: String,
    on: AtomicBool,
    byte: AtomicU8,
}

impl EmptyComponent {
    pub fn new(id: impl Into<String>) -> Self {
        EmptyComponent {
            id: id.into(),
            on: AtomicBool::new(false),
            byte: AtomicU8::new(0),
        }
    }
}

impl Component for EmptyComponent {
    fn id(&self) -> &str {
        &self.id
    }
}

impl BinaryInput for EmptyComponent {
    fn poll(&self) -> InputChange {
        InputChange::NoChange
    }
}

impl Toggle for EmptyComponent {
    fn toggle(&self, on: bool) -> CoreResult<()> {
        self.on.store(on, Ordering::Relaxed);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}

impl TimedToggle for EmptyComponent {
    fn toggle_for(&self, _duration: Duration) -> CoreResult<()> {
        Ok(())
    }
}

impl ByteOutput for EmptyComponent {
    fn send(&self, value: u8) -> CoreResult<()> {
        self.byte.store(value, Ordering::Relaxed);
        Ok(())
    }

    fn last_sent(&self) -> u8 {
        self.byte.load(Ordering::Relaxed)
    }
}

impl Stimmer for EmptyComponent {
    fn parametrize(&self, _params: &StimParams) -> CoreResult<()> {
        Ok(())
    }

    fn start(&self, _slot: u32, _stim_type: &str) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_binds_every_kind() {
        let source = EmptySource::default();
        for kind in [
            ComponentKind::BinaryInput,
            ComponentKind::Toggle,
            ComponentKind::TimedToggle,
            ComponentKind::ByteOutput,
            ComponentKind::Stimmer,
        ] {
            let handle = source.bind("c", kind, None).unwrap();
            assert_eq!(handle.kind(), kind);
            assert_eq!(handle.id(), "c");
        }
    }

    #[test]
    fn test_empty_input_never_changes() {
        let source = EmptySource::default();
        let ComponentHandle::BinaryInput(input) =
            source.bind("np1", ComponentKind::BinaryInput, None).unwrap()
        else {
            panic!("expected binary input");
        };
        assert_eq!(input.poll(), InputChange::NoChange);
    }

    #[test]
    fn test_empty_byte_output_remembers() {
        let component = EmptyComponent::new("port");
        component.send(0x2a).unwrap();
        assert_eq!(component.last_sent(), 0x2a);
    }
}
