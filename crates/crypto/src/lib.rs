//! # Petram Crypto
//!
//! Cryptographic primitives for the Petram beacon protocol:
//!
//! - [`keccak256`] - the hash function used for beacon derivation and
//!   message prehashing
//! - [`ecdsa`] - recoverable secp256k1 signatures for voting messages;
//!   the signer's public key is recovered from the signature itself
//! - [`ecvrf`] - an ECVRF over edwards25519 whose 80-byte proofs double as
//!   beacon proposals
//!
//! ## Example
//!
//! ```rust
//! use petram_crypto::ecdsa::PrivateKey;
//!
//! let key = PrivateKey::random();
//! let signature = key.sign(b"first round vote").unwrap();
//! let recovered = signature.recover(b"first round vote").unwrap();
//! assert_eq!(recovered, key.public_key());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ecdsa;
pub mod ecvrf;
pub mod hash;

pub use ecdsa::{PrivateKey, PublicKey, Signature};
pub use ecvrf::{VrfProof, VrfPublicKey, VrfSecretKey, VRF_PROOF_SIZE};
pub use hash::{keccak256, keccak256_concat};

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    /// The signature bytes are malformed or the wrong length.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The public key bytes are malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The private key bytes are malformed.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Public key recovery from a signature failed.
    #[error("signature recovery failed: {0}")]
    RecoveryFailed(String),
}
