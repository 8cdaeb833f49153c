//! Identity types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Chamber identity - index of one physical test enclosure
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChamberId(pub u32);

impl ChamberId {
    #[inline]
    pub fn new(index: u32) -> Self {
        ChamberId(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chamber({})", self.0)
    }
}

impl fmt::Display for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChamberId {
    fn from(index: u32) -> Self {
        ChamberId(index)
    }
}
