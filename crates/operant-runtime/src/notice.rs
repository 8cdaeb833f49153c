//! Operator notices
//!
//! The engine reports chamber outcomes the operator should see (completion,
//! faults, logger failures, removal) on an unbounded channel. Sending never
//! blocks a loop; a dropped receiver only silences the notices.

use operant_core::ChamberId;
use tokio::sync::mpsc;

/// Something the operator should know about a chamber
#[derive(Clone, Debug, PartialEq)]
pub enum ChamberNotice {
    /// The task reported completion and was stopped
    Completed { chamber: ChamberId, task: &'static str },
    /// The task failed during evaluation and was stopped
    Faulted {
        chamber: ChamberId,
        task: &'static str,
        error: String,
    },
    /// A logger failed; the chamber and its other loggers keep running
    LoggerFailed {
        chamber: ChamberId,
        logger: String,
        error: String,
    },
    /// The chamber's entry was deleted
    Removed { chamber: ChamberId },
}

impl ChamberNotice {
    pub fn chamber(&self) -> ChamberId {
        match self {
            ChamberNotice::Completed { chamber, .. }
            | ChamberNotice::Faulted { chamber, .. }
            | ChamberNotice::LoggerFailed { chamber, .. }
            | ChamberNotice::Removed { chamber } => *chamber,
        }
    }
}

/// Sending half of the notice channel
#[derive(Clone, Debug, Default)]
pub struct NoticeSink {
    tx: Option<mpsc::UnboundedSender<ChamberNotice>>,
}

impl NoticeSink {
    /// Sink with no receiver
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Sink and its receiving half
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChamberNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NoticeSink { tx: Some(tx) }, rx)
    }

    pub fn send(&self, notice: ChamberNotice) {
        if let Some(tx) = &self.tx {
            if tx.send(notice).is_err() {
                tracing::debug!("notice receiver dropped");
            }
        }
    }
}

impl From<mpsc::UnboundedSender<ChamberNotice>> for NoticeSink {
    fn from(tx: mpsc::UnboundedSender<ChamberNotice>) -> Self {
        NoticeSink { tx: Some(tx) }
    }
}
