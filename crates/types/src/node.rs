//! Miner node identity.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Size of a compressed secp256k1 signing public key in bytes.
pub const SIGNING_KEY_SIZE: usize = 33;

/// Size of a compressed Edwards VRF public key in bytes.
pub const VRF_KEY_SIZE: usize = 32;

/// Canonical byte form of a signing public key.
pub type SigningKeyBytes = [u8; SIGNING_KEY_SIZE];

/// Canonical byte form of a VRF public key.
pub type VrfKeyBytes = [u8; VRF_KEY_SIZE];

/// Identity of a miner participating in the beacon protocol.
///
/// A node is identified by the pair of its signing public key (used to sign
/// voting messages) and its VRF public key (used to verify beacon
/// proposals). Two identities are considered equal when their signing keys
/// match; the VRF key is bound to the signing key at registration time and
/// is not an independent identity.
#[derive(Debug, Clone, Copy)]
pub struct NodeId {
    /// Compressed secp256k1 public key the miner signs votes with.
    pub signing_key: SigningKeyBytes,
    /// Compressed Edwards public key the miner proves proposals with.
    pub vrf_key: VrfKeyBytes,
}

impl NodeId {
    /// Creates a node identity from its two public keys.
    pub const fn new(signing_key: SigningKeyBytes, vrf_key: VrfKeyBytes) -> Self {
        Self {
            signing_key,
            vrf_key,
        }
    }
}

// Identity equality is by signing key bytes only.
impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.signing_key == other.signing_key
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signing_key.hash(state);
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first four bytes of the signing key.
        write!(f, "{}", hex::encode(&self.signing_key[..4]))
    }
}
