//! Per-chamber lifecycle word
//!
//! All lifecycle flags of a chamber live in one atomic byte. The removal flag
//! is monotonic: once set it stays set until the entry is deleted. Each loop
//! acknowledges a removal by setting its own quiescence bit; the removal worker
//! waits on a condvar until all three bits are set.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

const REMOVAL_REQUESTED: u8 = 1 << 0;
const LOGIC_QUIESCED: u8 = 1 << 1;
const EVENTS_QUIESCED: u8 = 1 << 2;
const PRESENTATION_QUIESCED: u8 = 1 << 3;
const RUN_ENABLED: u8 = 1 << 4;

const ALL_QUIESCED: u8 = LOGIC_QUIESCED | EVENTS_QUIESCED | PRESENTATION_QUIESCED;

/// The engine loops that must acknowledge a removal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopRole {
    Logic,
    Events,
    Presentation,
}

impl LoopRole {
    fn bit(self) -> u8 {
        match self {
            LoopRole::Logic => LOGIC_QUIESCED,
            LoopRole::Events => EVENTS_QUIESCED,
            LoopRole::Presentation => PRESENTATION_QUIESCED,
        }
    }
}

/// Lifecycle phase derived from the flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChamberPhase {
    /// Added, not running
    Idle,
    /// Started; the logic loop evaluates it
    Running,
    /// Removal requested, waiting for the loops
    Quiescing,
    /// Every loop has let go; about to be deleted
    Quiesced,
}

impl fmt::Display for ChamberPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChamberPhase::Idle => "idle",
            ChamberPhase::Running => "running",
            ChamberPhase::Quiescing => "quiescing",
            ChamberPhase::Quiesced => "quiesced",
        };
        f.write_str(s)
    }
}

/// Lifecycle flags of one chamber entry
pub struct Lifecycle {
    word: AtomicU8,
    lock: Mutex<()>,
    quiesced: Condvar,
}

impl Lifecycle {
    /// All flags cleared
    pub fn new() -> Self {
        Lifecycle {
            word: AtomicU8::new(0),
            lock: Mutex::new(()),
            quiesced: Condvar::new(),
        }
    }

    #[inline]
    fn load(&self) -> u8 {
        self.word.load(Ordering::Acquire)
    }

    /// Set the removal flag; false if it was already set
    pub fn request_removal(&self) -> bool {
        let prev = self.word.fetch_or(REMOVAL_REQUESTED, Ordering::AcqRel);
        prev & REMOVAL_REQUESTED == 0
    }

    #[inline]
    pub fn is_removal_requested(&self) -> bool {
        self.load() & REMOVAL_REQUESTED != 0
    }

    /// Record that `role` will not touch this chamber again
    pub fn acknowledge(&self, role: LoopRole) {
        let prev = self.word.fetch_or(role.bit(), Ordering::AcqRel);
        if prev & role.bit() == 0 && (prev | role.bit()) & ALL_QUIESCED == ALL_QUIESCED {
            let _guard = self.lock.lock();
            self.quiesced.notify_all();
        }
    }

    pub fn is_acknowledged(&self, role: LoopRole) -> bool {
        self.load() & role.bit() != 0
    }

    pub fn is_quiesced(&self) -> bool {
        self.load() & ALL_QUIESCED == ALL_QUIESCED
    }

    /// Block until every loop has acknowledged, giving up after `timeout`
    ///
    /// Returns whether the chamber is quiesced.
    pub fn wait_quiesced_for(&self, timeout: Duration) -> bool {
        let mut guard = self.lock.lock();
        while !self.is_quiesced() {
            if self.quiesced.wait_for(&mut guard, timeout).timed_out() {
                return self.is_quiesced();
            }
        }
        true
    }

    pub fn set_run_enabled(&self, enabled: bool) {
        if enabled {
            self.word.fetch_or(RUN_ENABLED, Ordering::AcqRel);
        } else {
            self.word.fetch_and(!RUN_ENABLED, Ordering::AcqRel);
        }
    }

    #[inline]
    pub fn is_run_enabled(&self) -> bool {
        self.load() & RUN_ENABLED != 0
    }

    pub fn phase(&self) -> ChamberPhase {
        let word = self.load();
        if word & REMOVAL_REQUESTED != 0 {
            if word & ALL_QUIESCED == ALL_QUIESCED {
                ChamberPhase::Quiesced
            } else {
                ChamberPhase::Quiescing
            }
        } else if word & RUN_ENABLED != 0 {
            ChamberPhase::Running
        } else {
            ChamberPhase::Idle
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lifecycle({:#07b}, {})", self.load(), self.phase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_phase_progression() {
        let lc = Lifecycle::new();
        assert_eq!(lc.phase(), ChamberPhase::Idle);
        lc.set_run_enabled(true);
        assert_eq!(lc.phase(), ChamberPhase::Running);
        lc.set_run_enabled(false);
        assert_eq!(lc.phase(), ChamberPhase::Idle);

        assert!(lc.request_removal());
        assert_eq!(lc.phase(), ChamberPhase::Quiescing);
        lc.acknowledge(LoopRole::Logic);
        lc.acknowledge(LoopRole::Events);
        assert_eq!(lc.phase(), ChamberPhase::Quiescing);
        lc.acknowledge(LoopRole::Presentation);
        assert_eq!(lc.phase(), ChamberPhase::Quiesced);
    }

    #[test]
    fn test_second_removal_request_reports_false() {
        let lc = Lifecycle::new();
        assert!(lc.request_removal());
        assert!(!lc.request_removal());
        assert!(lc.is_removal_requested());
    }

    #[test]
    fn test_wait_wakes_on_last_acknowledgement() {
        let lc = Arc::new(Lifecycle::new());
        lc.request_removal();
        let waiter = {
            let lc = Arc::clone(&lc);
            thread::spawn(move || lc.wait_quiesced_for(Duration::from_secs(5)))
        };
        for role in [LoopRole::Presentation, LoopRole::Logic, LoopRole::Events] {
            thread::sleep(Duration::from_millis(5));
            lc.acknowledge(role);
        }
        assert!(waiter.join().unwrap());
        assert!(lc.is_quiesced());
    }

    #[test]
    fn test_wait_for_times_out() {
        let lc = Lifecycle::new();
        lc.request_removal();
        lc.acknowledge(LoopRole::Logic);
        assert!(!lc.wait_quiesced_for(Duration::from_millis(10)));
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Run(bool),
        Remove,
        Ack(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Run),
            Just(Op::Remove),
            (0u8..3).prop_map(Op::Ack),
        ]
    }

    proptest! {
        #[test]
        fn test_removal_flag_is_monotonic(ops in proptest::collection::vec(op(), 1..40)) {
            let lc = Lifecycle::new();
            let mut removed = false;
            for op in ops {
                match op {
                    Op::Run(on) => lc.set_run_enabled(on),
                    Op::Remove => {
                        let first = lc.request_removal();
                        prop_assert_eq!(first, !removed);
                        removed = true;
                    }
                    Op::Ack(i) => {
                        let role = [LoopRole::Logic, LoopRole::Events, LoopRole::Presentation][i as usize];
                        lc.acknowledge(role);
                        prop_assert!(lc.is_acknowledged(role));
                    }
                }
                prop_assert_eq!(lc.is_removal_requested(), removed);
                if removed {
                    prop_assert!(matches!(lc.phase(), ChamberPhase::Quiescing | ChamberPhase::Quiesced));
                }
            }
        }
    }
}
