//! # Petram Core
//!
//! Trait seams between the beacon protocol core and the node subsystems it
//! consumes. The beacon driver is written entirely against these traits:
//!
//! - [`ActivationDb`] - resolves miners' storage activations (the source of
//!   epoch membership and voting weight)
//! - [`Transport`] - fire-and-forget gossip broadcast
//! - [`EpochClock`] - epoch boundary ticks
//!
//! Production nodes wire real implementations behind these traits; tests
//! substitute in-memory fakes.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod traits;

pub use traits::activation::{ActivationDb, ActivationError, ActivationResult};
pub use traits::clock::{EpochClock, SystemClock};
pub use traits::transport::{GossipVerdict, PeerId, Transport, TransportError, TransportResult};
