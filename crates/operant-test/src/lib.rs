//! Operant Test Harness - simulated chambers for engine tests
//!
//! This crate provides:
//! - Simulated components (scripted inputs, recording toggles) and their source
//! - Recording, failing and panicking event loggers
//! - Recording and panicking presentations, and a scripted operator input device
//! - Small tasks built for tests (trial scenario, timer, faulting task)
//! - `RandomSubject`: seeded random pokes for soak tests
//! - `Harness`: the engine loops stepped by hand against a manual clock

pub mod components;
pub mod loggers;
pub mod presentation;
pub mod tasks;
pub mod subject;
pub mod harness;

pub use components::*;
pub use loggers::*;
pub use presentation::*;
pub use tasks::*;
pub use subject::*;
pub use harness::*;
