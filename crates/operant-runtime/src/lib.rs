//! Operant Runtime - the multi-chamber execution engine
//!
//! Three loops share one chamber registry, each on its own thread:
//! 1. Logic: evaluates every running chamber's task at a fixed rate
//! 2. Events: drains buffered events to each chamber's loggers
//! 3. Presentation: draws every chamber's snapshot at a capped frame rate
//!
//! Chambers are added, started, stopped and removed at runtime through the
//! `LifecycleManager`. Removal is a handshake: each loop acknowledges before
//! the entry is deleted, so no pass ever sees a half-torn-down chamber and no
//! buffered event is lost.

pub mod error;
pub mod notice;
pub mod lifecycle;
pub mod registry;
pub mod presentation;
pub mod manager;
pub mod logic;
pub mod dispatch;
pub mod render;
pub mod config;
pub mod workstation;

pub use error::*;
pub use notice::*;
pub use lifecycle::*;
pub use registry::*;
pub use presentation::*;
pub use manager::{ChamberSetup, ChamberStatus, LifecycleManager, RemovalHandle};
pub use logic::*;
pub use dispatch::*;
pub use render::*;
pub use config::*;
pub use workstation::*;
