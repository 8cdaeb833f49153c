//! Event definitions
//!
//! Events are immutable records produced by a task while it runs. A chamber's
//! events are delivered to its loggers in exactly the order they were produced.

use serde::Serialize;

use crate::{InputChange, Metadata, TaskTime};

/// What an event records
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A hardware input changed (e.g. a nose poke was entered)
    Input {
        component: String,
        change: InputChange,
    },
    /// The task entered a new state
    State { state: &'static str },
    /// The task was stopped while in `state`, entered at `entered_at`
    FinalState {
        state: &'static str,
        entered_at: TaskTime,
    },
}

/// Timestamped task event
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    /// Offset from task start
    pub time: TaskTime,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Event {
    pub fn input(component: impl Into<String>, change: InputChange, time: TaskTime) -> Self {
        Event {
            kind: EventKind::Input {
                component: component.into(),
                change,
            },
            time,
            metadata: Metadata::new(),
        }
    }

    pub fn state(state: &'static str, time: TaskTime, metadata: Metadata) -> Self {
        Event {
            kind: EventKind::State { state },
            time,
            metadata,
        }
    }

    pub fn final_state(state: &'static str, entered_at: TaskTime, time: TaskTime) -> Self {
        Event {
            kind: EventKind::FinalState { state, entered_at },
            time,
            metadata: Metadata::new(),
        }
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        matches!(self.kind, EventKind::Input { .. })
    }

    #[inline]
    pub fn is_state(&self) -> bool {
        matches!(self.kind, EventKind::State { .. })
    }

    /// State named by a state or final-state event
    pub fn state_name(&self) -> Option<&'static str> {
        match self.kind {
            EventKind::State { state } | EventKind::FinalState { state, .. } => Some(state),
            EventKind::Input { .. } => None,
        }
    }

    /// Short label used by text loggers
    pub fn label(&self) -> String {
        match &self.kind {
            EventKind::Input { component, change } => format!("{component}:{change}"),
            EventKind::State { state } => (*state).to_string(),
            EventKind::FinalState { state, .. } => format!("final:{state}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata;

    #[test]
    fn test_event_predicates() {
        let input = Event::input("trough", InputChange::Entered, TaskTime::from_millis(10));
        let state = Event::state("REWARD", TaskTime::from_millis(10), Metadata::new());
        assert!(input.is_input());
        assert!(!input.is_state());
        assert!(state.is_state());
        assert_eq!(state.state_name(), Some("REWARD"));
        assert_eq!(input.state_name(), None);
    }

    #[test]
    fn test_event_labels() {
        let input = Event::input("np3", InputChange::Exited, TaskTime::ZERO);
        assert_eq!(input.label(), "np3:exited");
        let last = Event::final_state("LIMITED_HOLD", TaskTime::ZERO, TaskTime::from_millis(5));
        assert_eq!(last.label(), "final:LIMITED_HOLD");
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::state(
            "POST_RESPONSE_INTERVAL",
            TaskTime::from_millis(2500),
            metadata([("response", "premature")]),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["state"], "POST_RESPONSE_INTERVAL");
        assert_eq!(json["time"], 2.5);
        assert_eq!(json["metadata"]["response"], "premature");

        let input = Event::input("trough", InputChange::Entered, TaskTime::ZERO);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["type"], "input");
        assert_eq!(json["change"], "entered");
        assert!(json.get("metadata").is_none());
    }
}
