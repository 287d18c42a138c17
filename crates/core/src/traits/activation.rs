//! Activation store interface.
//!
//! The activation store is the node's persistent record of storage
//! commitments. The beacon core consults it for three things: whether a
//! miner has an activation targeting a given epoch, the activation's header
//! (from which voting weight is derived), and the timestamp at which the
//! activation was first seen.

use std::time::SystemTime;

use thiserror::Error;

use petram_types::{ActivationHeader, AtxId, EpochId, NodeId};

/// Errors surfaced by the activation store.
///
/// `NotFound` is a distinguished outcome the protocol reacts to (the miner
/// simply is not a member of the epoch); everything else is an
/// infrastructure failure that propagates unchanged so operators can
/// observe it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    /// No activation exists for the requested miner and epoch.
    #[error("activation not found")]
    NotFound,

    /// The lookup itself failed (I/O, corruption, ...).
    #[error("activation lookup failed: {0}")]
    Lookup(String),
}

/// Result type for activation store operations.
pub type ActivationResult<T> = Result<T, ActivationError>;

/// Read access to the node's activation store.
///
/// All methods are synchronous point lookups against a local store; they
/// are called from lock-adjacent hot paths and must not block on network
/// I/O.
pub trait ActivationDb: Send + Sync + 'static {
    /// Returns the id of the miner's activation targeting `epoch`.
    fn node_atx_for_epoch(&self, node: &NodeId, epoch: EpochId) -> ActivationResult<AtxId>;

    /// Returns the header of an activation.
    fn atx_header(&self, id: &AtxId) -> ActivationResult<ActivationHeader>;

    /// Returns the instant the activation was first received.
    fn atx_timestamp(&self, id: &AtxId) -> ActivationResult<SystemTime>;

    /// Returns the total voting weight committed for `epoch`.
    ///
    /// This is the sum of [`ActivationHeader::weight`] over every
    /// activation targeting the epoch; the proposal eligibility threshold
    /// is derived from it.
    fn epoch_total_weight(&self, epoch: EpochId) -> ActivationResult<u64>;
}
