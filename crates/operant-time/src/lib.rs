//! Operant Time - clocks and loop pacing
//!
//! - `MonotonicClock`: the engine clock, never decreasing
//! - `ManualClock`: a clock advanced by hand, for deterministic tests
//! - `Pacer`: best-effort fixed-interval scheduling for the engine loops

pub mod clock;
pub mod pacer;

pub use clock::*;
pub use pacer::*;
