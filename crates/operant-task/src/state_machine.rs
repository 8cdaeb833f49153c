//! Timed state machine bookkeeping
//!
//! INVARIANTS:
//! - `state` is always one of the declared states; the initial state is fixed
//!   at construction
//! - `entry_time` changes only when the machine enters a state
//! - `cur_time` never decreases: an older clock reading is clamped
//! - "in state S for D" iff `cur_time - entry_time >= D`

use std::fmt;
use std::mem;
use std::time::Duration;

use operant_core::{Event, InputChange, Metadata, TaskMetadata, TaskTime, Timestamp};

/// Declared state set of a task
pub trait TaskState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every declared state
    const ALL: &'static [Self];

    /// Name written to state events
    fn name(self) -> &'static str;
}

/// Declare a task's state enum together with its `TaskState` impl
///
/// ```
/// operant_task::task_states! {
///     pub enum Phase {
///         Waiting => "WAITING",
///         Reward => "REWARD",
///     }
/// }
/// ```
#[macro_export]
macro_rules! task_states {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::TaskState for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }
    };
}

/// State, timing and event buffer of one running task
pub struct StateMachine<S: TaskState> {
    state: S,
    /// When the current state was entered
    entry_time: Timestamp,
    /// Last evaluation time
    cur_time: Timestamp,
    /// When the task was started (construction time until then)
    start_time: Timestamp,
    /// Events produced since the last drain
    events: Vec<Event>,
    metadata: TaskMetadata,
    paused: bool,
    started: bool,
}

impl<S: TaskState> StateMachine<S> {
    pub fn new(initial: S, metadata: TaskMetadata, now: Timestamp) -> Self {
        StateMachine {
            state: initial,
            entry_time: now,
            cur_time: now,
            start_time: now,
            events: Vec::new(),
            metadata,
            paused: false,
            started: false,
        }
    }

    #[inline]
    pub fn state(&self) -> S {
        self.state
    }

    #[inline]
    pub fn entry_time(&self) -> Timestamp {
        self.entry_time
    }

    #[inline]
    pub fn cur_time(&self) -> Timestamp {
        self.cur_time
    }

    #[inline]
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Move the evaluation time forward to `now`
    pub fn advance(&mut self, now: Timestamp) -> Timestamp {
        self.cur_time = self.cur_time.max(now);
        self.cur_time
    }

    /// Time spent in the current state
    #[inline]
    pub fn time_in_state(&self) -> Duration {
        self.cur_time - self.entry_time
    }

    /// True once the current state has been held for at least `d`
    #[inline]
    pub fn in_state_for(&self, d: Duration) -> bool {
        self.time_in_state() >= d
    }

    /// Time since the task started
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.cur_time - self.start_time
    }

    /// Current time as an offset from the task start
    #[inline]
    pub fn task_time(&self) -> TaskTime {
        TaskTime::between(self.start_time, self.cur_time)
    }

    /// Enter `next`, resetting the entry time and emitting a state event
    pub fn change_state(&mut self, next: S, metadata: Metadata) {
        self.state = next;
        self.entry_time = self.cur_time;
        let time = self.task_time();
        self.events.push(Event::state(next.name(), time, metadata));
    }

    /// Record a polled input transition; `NoChange` produces no event
    pub fn record_input(&mut self, component: &str, change: InputChange) -> InputChange {
        if change != InputChange::NoChange {
            let time = self.task_time();
            self.events.push(Event::input(component, change, time));
        }
        change
    }

    /// Begin the task at `now`, re-entering the current state
    pub fn start(&mut self, now: Timestamp) {
        self.advance(now);
        self.start_time = self.cur_time;
        self.started = true;
        self.paused = false;
        self.change_state(self.state, Metadata::new());
    }

    /// End the task, emitting a final-state event
    pub fn stop(&mut self, now: Timestamp) {
        self.advance(now);
        let entered_at = TaskTime::between(self.start_time, self.entry_time);
        let time = self.task_time();
        self.events
            .push(Event::final_state(self.state.name(), entered_at, time));
        self.started = false;
        self.paused = false;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Append events produced elsewhere (a sub-task), keeping their order
    pub fn extend_events(&mut self, events: Vec<Event>) {
        if self.events.is_empty() {
            self.events = events;
        } else {
            self.events.extend(events);
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Hand over the buffered events, leaving the buffer empty
    pub fn take_events(&mut self) -> Vec<Event> {
        mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operant_core::{metadata, ChamberId, EventKind};
    use proptest::prelude::*;

    crate::task_states! {
        enum Trial {
            Initiation => "INITIATION",
            Stimulus => "STIMULUS",
            Reward => "REWARD",
        }
    }

    fn machine() -> StateMachine<Trial> {
        let md = TaskMetadata::new(ChamberId::new(0), "test");
        StateMachine::new(Trial::Initiation, md, Timestamp::from_millis(1000))
    }

    #[test]
    fn test_initial_state() {
        let sm = machine();
        assert_eq!(sm.state(), Trial::Initiation);
        assert!(!sm.is_started());
        assert!(sm.events().is_empty());
    }

    #[test]
    fn test_start_emits_initial_state_event() {
        let mut sm = machine();
        sm.start(Timestamp::from_millis(2000));
        assert!(sm.is_started());
        assert_eq!(sm.start_time(), Timestamp::from_millis(2000));
        let events = sm.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state_name(), Some("INITIATION"));
        assert_eq!(events[0].time, TaskTime::ZERO);
    }

    #[test]
    fn test_change_state_resets_entry_time() {
        let mut sm = machine();
        sm.start(Timestamp::from_millis(0));
        sm.advance(Timestamp::from_millis(1500));
        assert_eq!(sm.time_in_state(), Duration::from_millis(1500));
        sm.change_state(Trial::Stimulus, metadata([("trial", 1)]));
        assert_eq!(sm.entry_time(), Timestamp::from_millis(1500));
        assert_eq!(sm.time_in_state(), Duration::ZERO);

        let last = sm.events().last().unwrap();
        assert_eq!(last.kind, EventKind::State { state: "STIMULUS" });
        assert_eq!(last.time, TaskTime::from_millis(1500));
        assert_eq!(last.metadata["trial"], 1);
    }

    #[test]
    fn test_in_state_for_threshold() {
        let mut sm = machine();
        sm.start(Timestamp::ZERO);
        sm.advance(Timestamp::from_millis(4999));
        assert!(!sm.in_state_for(Duration::from_secs(5)));
        sm.advance(Timestamp::from_millis(5000));
        assert!(sm.in_state_for(Duration::from_secs(5)));
    }

    #[test]
    fn test_time_never_moves_back() {
        let mut sm = machine();
        sm.advance(Timestamp::from_millis(5000));
        sm.advance(Timestamp::from_millis(3000));
        assert_eq!(sm.cur_time(), Timestamp::from_millis(5000));
    }

    #[test]
    fn test_record_input_skips_no_change() {
        let mut sm = machine();
        sm.record_input("trough", InputChange::NoChange);
        assert!(!sm.has_events());
        sm.record_input("trough", InputChange::Entered);
        assert_eq!(sm.events().len(), 1);
        assert!(sm.events()[0].is_input());
    }

    #[test]
    fn test_stop_emits_final_state() {
        let mut sm = machine();
        sm.start(Timestamp::ZERO);
        sm.advance(Timestamp::from_millis(200));
        sm.change_state(Trial::Reward, Metadata::new());
        sm.take_events();
        sm.stop(Timestamp::from_millis(900));
        assert!(!sm.is_started());
        let events = sm.take_events();
        assert_eq!(
            events[0].kind,
            EventKind::FinalState {
                state: "REWARD",
                entered_at: TaskTime::from_millis(200),
            }
        );
        assert_eq!(events[0].time, TaskTime::from_millis(900));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Advance(u64),
        Rewind(u64),
        Change(usize),
        Input,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..10_000).prop_map(Op::Advance),
            (0u64..10_000).prop_map(Op::Rewind),
            (0usize..3).prop_map(Op::Change),
            Just(Op::Input),
        ]
    }

    proptest! {
        #[test]
        fn prop_entry_time_resets_only_on_change(ops in proptest::collection::vec(op(), 0..64)) {
            let mut sm = machine();
            sm.start(Timestamp::from_millis(1000));
            let mut now = sm.cur_time();

            for op in ops {
                let entry_before = sm.entry_time();
                let cur_before = sm.cur_time();
                match op {
                    Op::Advance(dt) => {
                        now = now + Duration::from_micros(dt);
                        sm.advance(now);
                        prop_assert_eq!(sm.entry_time(), entry_before);
                    }
                    Op::Rewind(dt) => {
                        sm.advance(Timestamp::from_micros(now.as_micros().saturating_sub(dt)));
                        prop_assert_eq!(sm.entry_time(), entry_before);
                    }
                    Op::Change(i) => {
                        sm.change_state(Trial::ALL[i], Metadata::new());
                        prop_assert_eq!(sm.entry_time(), sm.cur_time());
                    }
                    Op::Input => {
                        sm.record_input("np1", InputChange::Entered);
                        prop_assert_eq!(sm.entry_time(), entry_before);
                    }
                }
                prop_assert!(Trial::ALL.contains(&sm.state()));
                prop_assert!(sm.cur_time() >= cur_before);
                prop_assert!(sm.entry_time() >= entry_before);
                prop_assert!(sm.entry_time() <= sm.cur_time());
            }
        }
    }
}
