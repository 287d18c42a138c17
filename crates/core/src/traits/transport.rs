//! Gossip transport interface.
//!
//! The beacon core broadcasts its own proposals and votes through this
//! seam and receives inbound payloads as raw bytes from the substrate. The
//! core never awaits delivery acknowledgement; broadcast is
//! fire-and-forget.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport is not running.
    #[error("transport not running")]
    NotRunning,

    /// Generic transport error.
    #[error("transport error: {0}")]
    Internal(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A unique identifier for a network peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub Bytes);

impl PeerId {
    /// Creates a peer id from raw bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes of the peer id.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The verdict an ingress handler returns to the gossip substrate.
///
/// The substrate uses this to decide whether to re-propagate a message to
/// other peers; handlers never surface their internal errors across this
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipVerdict {
    /// The message was valid and applied; relay it.
    Accept,
    /// The message was not applicable (duplicate, wrong epoch, node
    /// shutting down); drop it without penalizing the sender.
    Ignore,
    /// The message was malformed or failed verification; drop it and
    /// penalize the sender.
    Reject,
}

/// Outbound gossip broadcast.
///
/// # Thread safety
///
/// Implementations must be thread-safe (`Send + Sync`); the driver
/// broadcasts from its epoch task while handlers run on transport threads.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Broadcasts a message to all peers subscribed to `topic`.
    async fn broadcast(&self, topic: &str, data: &[u8]) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_is_hex() {
        let peer = PeerId::from_bytes(vec![0xde, 0xad]);
        assert_eq!(peer.to_string(), "dead");
    }
}
