//! Recoverable ECDSA signatures over secp256k1.
//!
//! Voting messages are signed with secp256k1 ECDSA over the Keccak256
//! prehash of the canonically encoded message body. Signatures carry a
//! recovery id, so verification recovers the signer's public key directly
//! from the signature; miners never ship their public key alongside a vote.
//!
//! ## Key and signature sizes
//!
//! - `PrivateKey` - 32 bytes
//! - `PublicKey` - 33 bytes (SEC1 compressed)
//! - `Signature` - 65 bytes (`r || s || v`)

use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::rngs::OsRng;

use crate::hash::keccak256;
use crate::{CryptoError, Result};

/// Size of a serialized signature in bytes (`r || s || v`).
pub const SIGNATURE_SIZE: usize = 65;

/// Size of a compressed public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// A secp256k1 private key used for signing voting messages.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a random private key using the system RNG.
    pub fn random() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        Self {
            inner: SigningKey::from(secret_key),
        }
    }

    /// Creates a private key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key =
            SecretKey::from_bytes(bytes.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self {
            inner: SigningKey::from(secret_key),
        })
    }

    /// Derives the public key for this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// Signs data with this key.
    ///
    /// The data is hashed with Keccak256 and the prehash is signed. The
    /// resulting signature carries a recovery id, so the matching public
    /// key can be recovered by [`Signature::recover`].
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        let prehash = keccak256(data);
        let (signature, recovery_id) = self
            .inner
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(Signature { bytes })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// A secp256k1 public key identifying a vote signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Creates a public key from its compressed SEC1 byte form.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self> {
        let inner = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Returns the compressed SEC1 byte form of the key.
    ///
    /// This is the canonical form used to key dedup sets and ballot maps.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.inner.to_encoded_point(true);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }
}

/// A recoverable ECDSA signature (`r || s || v`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_SIZE],
}

impl Signature {
    /// Parses a signature from its 65-byte serialized form.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            )));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Returns the serialized signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.bytes
    }

    /// Recovers the public key that produced this signature over `data`.
    ///
    /// `data` is hashed with Keccak256 exactly as in [`PrivateKey::sign`].
    /// A signature produced over different data recovers to a different
    /// (or no) key, so callers compare recovered keys against registered
    /// identities rather than verifying against a known key.
    pub fn recover(&self, data: &[u8]) -> Result<PublicKey> {
        let prehash = keccak256(data);
        let signature = K256Signature::from_slice(&self.bytes[..64])
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.bytes[64])
            .ok_or_else(|| CryptoError::InvalidSignature("invalid recovery id".into()))?;

        let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id)
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
        Ok(PublicKey { inner: key })
    }
}
