//! Storage activation references.
//!
//! An activation is a miner's per-epoch proof of storage commitment. The
//! beacon core never validates activations itself; it only resolves them
//! through the activation store and derives voting weight from the header.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Size of an activation identifier in bytes.
pub const ATX_ID_SIZE: usize = 32;

/// Opaque identifier of an activation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AtxId([u8; ATX_ID_SIZE]);

impl AtxId {
    /// Creates an activation id from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; ATX_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates an activation id from a slice.
    ///
    /// Returns an error if the slice length is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != ATX_ID_SIZE {
            return Err(Error::InvalidLength {
                expected: ATX_ID_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; ATX_ID_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Returns the raw bytes of the identifier.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; ATX_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for AtxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AtxId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

/// The subset of an activation header the beacon protocol consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationHeader {
    /// First tick covered by the commitment (inclusive).
    pub start_tick: u64,
    /// Last tick covered by the commitment (exclusive).
    pub end_tick: u64,
    /// Number of committed storage units.
    pub num_units: u32,
}

impl ActivationHeader {
    /// The miner's voting weight: `(end_tick - start_tick) * num_units`.
    ///
    /// Saturating on both operations; a malformed header with
    /// `end_tick < start_tick` yields zero weight and is rejected upstream.
    pub fn weight(&self) -> u64 {
        self.end_tick
            .saturating_sub(self.start_tick)
            .saturating_mul(u64::from(self.num_units))
    }
}
