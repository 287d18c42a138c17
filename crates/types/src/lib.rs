//! # Petram Types
//!
//! Core type definitions for the Petram random beacon protocol.
//!
//! This crate provides the fundamental identifiers used throughout the
//! beacon subsystem:
//! - [`EpochId`] and [`RoundId`] - protocol time coordinates
//! - [`NodeId`] - a miner's signing and VRF key pair
//! - [`AtxId`] and [`ActivationHeader`] - storage activation references
//! - [`Beacon`] - the agreed-upon random value for an epoch
//!
//! ## Example
//!
//! ```rust
//! use petram_types::{ActivationHeader, Beacon, EpochId};
//!
//! let epoch = EpochId::new(10);
//! assert_eq!(epoch.next(), EpochId::new(11));
//!
//! // Voting weight is derived from the activation's tick range and units.
//! let header = ActivationHeader { start_tick: 1, end_tick: 3, num_units: 5 };
//! assert_eq!(header.weight(), 10);
//!
//! let beacon = Beacon::new([0xab; 32]);
//! assert!(beacon.to_string().starts_with("abab"));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod activation;
pub mod beacon;
pub mod epoch;
pub mod node;

// Re-export main types at crate root
pub use activation::{ActivationHeader, AtxId};
pub use beacon::{Beacon, BEACON_SIZE};
pub use epoch::{EpochId, RoundId, FIRST_ROUND};
pub use node::{NodeId, SigningKeyBytes, VrfKeyBytes, SIGNING_KEY_SIZE, VRF_KEY_SIZE};

/// Result type alias for Petram type operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Petram types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}
