//! Operant Task - the per-chamber state machines
//!
//! A task is a timed state machine that polls its chamber's components once
//! per evaluation tick, records input transitions, and moves between its
//! declared states. This crate provides:
//! - `StateMachine`: state, entry time, clock and event buffer bookkeeping
//! - `Task`: the object-safe interface the scheduler drives
//! - `TaskLogic` / `TaskInstance`: protocol logic on top of a state machine
//! - `TaskSequence`: a task that delegates to one sub-task per phase
//! - `Constants` / `Protocol`: declared defaults and their overrides
//! - `TaskRegistry`: name → factory, resolved when a chamber is configured
//! - `FileEventLogger`: JSON-lines or CSV event files
//! - Reference tasks (`FiveChoice`, `Habituation`, `HabituationSequence`)

pub mod error;
pub mod state_machine;
pub mod task;
pub mod protocol;
pub mod sequence;
pub mod registry;
pub mod logger;
pub mod tasks;

pub use error::*;
pub use state_machine::*;
pub use task::*;
pub use protocol::*;
pub use sequence::*;
pub use registry::*;
pub use logger::*;
