//! Epoch and round identifiers.
//!
//! The beacon protocol runs one instance per epoch. Within an epoch, the
//! voting stages are numbered rounds: round 0 is the first voting round
//! (over full proposal lists), rounds `1..=K` carry compact bit-vector
//! votes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a voting round within an epoch.
pub type RoundId = u32;

/// The first voting round, in which full proposal lists are exchanged.
pub const FIRST_ROUND: RoundId = 0;

/// Monotonically increasing epoch number.
///
/// Epochs are the unit of beacon agreement: the protocol instance running
/// during epoch `e` produces the beacon for epoch `e + 1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct EpochId(u32);

impl EpochId {
    /// Creates an epoch identifier from its raw number.
    #[inline]
    pub const fn new(epoch: u32) -> Self {
        Self(epoch)
    }

    /// Returns the raw epoch number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the epoch following this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the epoch preceding this one, or `None` for the first epoch.
    ///
    /// Activation lookups target the previous epoch; nothing can precede
    /// epoch zero.
    #[inline]
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EpochId {
    fn from(epoch: u32) -> Self {
        Self(epoch)
    }
}
