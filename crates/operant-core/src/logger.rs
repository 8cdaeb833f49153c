//! Event logger contract

use crate::{CoreResult, Event};

/// Sink for a chamber's events
///
/// The dispatcher calls `log_events` with every batch drained from the chamber,
/// in production order. Batches may be empty.
pub trait EventLogger: Send {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    fn start(&mut self) -> CoreResult<()>;

    fn is_started(&self) -> bool;

    fn log_events(&mut self, events: &[Event]) -> CoreResult<()>;

    fn close(&mut self) -> CoreResult<()>;
}
