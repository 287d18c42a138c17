//! # Petram Beacon
//!
//! The per-epoch random beacon protocol for the Petram proof-of-space-time
//! node. Each epoch, every eligible miner nominates a VRF-proved proposal,
//! the network runs a multi-round weighted voting protocol over the
//! proposal set, and the hash of the surviving proposals becomes the
//! epoch's shared unpredictable beacon. Voting weight is each miner's
//! storage commitment for the epoch.
//!
//! ## Protocol flow
//!
//! ```text
//!            epoch tick
//!                │
//!                ▼
//! ┌───────────────────────────┐
//! │      PROPOSAL PHASE       │  miners broadcast VRF proofs over the
//! │                           │  canonical (domain, epoch) message;
//! │                           │  arrivals classify as valid / late
//! └─────────────┬─────────────┘
//!               │ deadline (+ grace period for stragglers)
//!               ▼
//! ┌───────────────────────────┐
//! │       FIRST ROUND         │  full ballots: the ordered proposal
//! │                           │  lists each voter observed
//! └─────────────┬─────────────┘
//!               ▼
//! ┌───────────────────────────┐
//! │     ROUNDS 1..=K          │  bit-vector votes over each voter's own
//! │                           │  first-round ballot; margins accumulate
//! │                           │  ±weight per proposal
//! └─────────────┬─────────────┘
//!               ▼
//! ┌───────────────────────────┐
//! │        FINALIZE           │  beacon = hash(sorted survivors),
//! │                           │  recorded for epoch + 1
//! └───────────────────────────┘
//! ```
//!
//! ## Structure
//!
//! - [`ProtocolDriver`] - owns the epoch lifecycle and the three gossip
//!   ingress handlers
//! - [`BeaconConfig`] - timing and sizing knobs
//! - [`messages`] - wire formats and their canonical codec
//! - [`ProposalChecker`] - VRF eligibility threshold
//! - [`WeightResolver`] - activation-backed voting weight
//!
//! The driver consumes the node's activation store, transport, and epoch
//! clock through the seams in `petram-core`; nothing here persists state,
//! and a restart mid-epoch abandons that epoch.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod checker;
pub mod config;
pub mod driver;
pub mod handlers;
pub mod messages;
mod state;
pub mod weight;

// Re-export main types at crate root for convenience
pub use checker::{ProposalChecker, Ratio};
pub use config::{BeaconConfig, ConfigError};
pub use driver::{BeaconError, ProtocolDriver};
pub use handlers::HandlerError;
pub use messages::{
    proposal_vrf_message, topics, CodecError, FirstVotingMessage, FollowingVotingMessage,
    ProposalMessage,
};
pub use weight::{WeightError, WeightResolver};
