//! The beacon value.

use std::fmt;

use crate::{Error, Result};

/// Size of a beacon value in bytes.
///
/// Proposal values on the wire are the first `BEACON_SIZE` bytes of a VRF
/// proof, and the final beacon is a hash truncated to the same width.
pub const BEACON_SIZE: usize = 32;

/// The agreed-upon unpredictable random value for an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Beacon([u8; BEACON_SIZE]);

impl Beacon {
    /// Creates a beacon from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; BEACON_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a beacon from a slice.
    ///
    /// Returns an error if the slice length is not exactly [`BEACON_SIZE`].
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != BEACON_SIZE {
            return Err(Error::InvalidLength {
                expected: BEACON_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; BEACON_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Returns the raw bytes of the beacon.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; BEACON_SIZE] {
        &self.0
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Beacon {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_checks_length() {
        assert!(Beacon::from_slice(&[0u8; BEACON_SIZE]).is_ok());
        assert!(Beacon::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn display_is_hex() {
        let beacon = Beacon::new([0x0f; BEACON_SIZE]);
        assert_eq!(beacon.to_string(), "0f".repeat(BEACON_SIZE));
    }
}
