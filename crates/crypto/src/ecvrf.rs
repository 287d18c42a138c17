//! ECVRF over edwards25519.
//!
//! Beacon proposals are VRF proofs: a miner proves it evaluated the VRF on
//! the canonical epoch message, and the proof itself is unpredictable to
//! anyone without the secret key. The proof serializes to exactly
//! [`VRF_PROOF_SIZE`] bytes laid out as `gamma[32] || c[16] || s[32]` (the
//! RFC 9381 pi-string shape); the first 32 bytes double as the miner's
//! proposal value, and eligibility checks interpret the whole proof as a
//! big-endian integer.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::VartimeMultiscalarMul;
use sha2::{Digest, Sha512};

/// Size of a serialized VRF proof in bytes.
pub const VRF_PROOF_SIZE: usize = 80;

/// Size of a compressed VRF public key in bytes.
pub const VRF_PUBLIC_KEY_SIZE: usize = 32;

const CHALLENGE_SIZE: usize = 16;

const DOMAIN_HASH_TO_CURVE: &[u8] = b"petram.vrf.h2c";
const DOMAIN_NONCE: &[u8] = b"petram.vrf.nonce";
const DOMAIN_CHALLENGE: &[u8] = b"petram.vrf.challenge";

/// A VRF proof (`gamma || c || s`), fixed at 80 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VrfProof([u8; VRF_PROOF_SIZE]);

impl VrfProof {
    /// Returns the serialized proof bytes.
    pub fn as_bytes(&self) -> &[u8; VRF_PROOF_SIZE] {
        &self.0
    }

    /// Returns the serialized proof as an owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for VrfProof {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A VRF secret key.
///
/// Derived from a 32-byte seed using SHA-512 and Ed25519-style clamping.
#[derive(Clone)]
pub struct VrfSecretKey {
    scalar: Scalar,
    public: VrfPublicKey,
}

impl VrfSecretKey {
    /// Derives a secret key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(seed);
        let hash = hasher.finalize();

        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&hash[..32]);
        // Clamp according to the Ed25519 specification.
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 127;
        scalar_bytes[31] |= 64;

        let scalar = Scalar::from_bytes_mod_order(scalar_bytes);
        let point = scalar * ED25519_BASEPOINT_POINT;

        Self {
            scalar,
            public: VrfPublicKey {
                point,
                compressed: point.compress().to_bytes(),
            },
        }
    }

    /// Returns the corresponding public key.
    pub fn public_key(&self) -> &VrfPublicKey {
        &self.public
    }

    /// Produces a proof over `alpha`.
    ///
    /// Proofs are deterministic: the same key and input always produce the
    /// same proof bytes, which is what makes the first 32 bytes usable as a
    /// stable proposal value.
    pub fn prove(&self, alpha: &[u8]) -> VrfProof {
        let h = hash_to_curve(alpha);
        let gamma = self.scalar * h;

        let k = self.nonce(alpha);
        let u = k * ED25519_BASEPOINT_POINT;
        let v = k * h;

        let c_bytes = challenge(&self.public.compressed, &h, &gamma, &u, &v);
        let c = challenge_scalar(&c_bytes);
        let s = k - c * self.scalar;

        let mut proof = [0u8; VRF_PROOF_SIZE];
        proof[..32].copy_from_slice(&gamma.compress().to_bytes());
        proof[32..32 + CHALLENGE_SIZE].copy_from_slice(&c_bytes);
        proof[32 + CHALLENGE_SIZE..].copy_from_slice(&s.to_bytes());
        VrfProof(proof)
    }

    /// Deterministic nonce for the proof, binding key, and input.
    fn nonce(&self, alpha: &[u8]) -> Scalar {
        let mut hasher = Sha512::new();
        hasher.update(DOMAIN_NONCE);
        hasher.update(self.scalar.as_bytes());
        hasher.update(alpha);
        Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
    }
}

impl std::fmt::Debug for VrfSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrfSecretKey")
            .field("public", &hex::encode(self.public.compressed))
            .finish_non_exhaustive()
    }
}

/// A VRF public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfPublicKey {
    point: EdwardsPoint,
    compressed: [u8; VRF_PUBLIC_KEY_SIZE],
}

impl VrfPublicKey {
    /// Creates a public key from its compressed byte form.
    ///
    /// Returns `None` if the bytes do not decode to a curve point.
    pub fn from_bytes(bytes: &[u8; VRF_PUBLIC_KEY_SIZE]) -> Option<Self> {
        let compressed = CompressedEdwardsY::from_slice(bytes).ok()?;
        let point = compressed.decompress()?;
        Some(Self {
            point,
            compressed: *bytes,
        })
    }

    /// Returns the compressed byte form of the key.
    pub fn to_bytes(&self) -> [u8; VRF_PUBLIC_KEY_SIZE] {
        self.compressed
    }

    /// Verifies a serialized proof over `alpha`.
    ///
    /// Accepts the raw wire bytes; anything that is not exactly
    /// [`VRF_PROOF_SIZE`] bytes of well-formed proof fails verification
    /// rather than erroring, since gossip delivers arbitrary bytes.
    pub fn verify(&self, alpha: &[u8], proof: &[u8]) -> bool {
        if proof.len() != VRF_PROOF_SIZE {
            return false;
        }

        let Ok(gamma_compressed) = CompressedEdwardsY::from_slice(&proof[..32]) else {
            return false;
        };
        let Some(gamma) = gamma_compressed.decompress() else {
            return false;
        };

        let mut c_bytes = [0u8; CHALLENGE_SIZE];
        c_bytes.copy_from_slice(&proof[32..32 + CHALLENGE_SIZE]);
        let c = challenge_scalar(&c_bytes);

        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&proof[32 + CHALLENGE_SIZE..]);
        let s_opt = Scalar::from_canonical_bytes(s_bytes);
        if s_opt.is_none().into() {
            return false;
        }
        let s = s_opt.unwrap();

        let h = hash_to_curve(alpha);

        // U = c*Y + s*G and V = c*Gamma + s*H must reproduce the challenge.
        let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &self.point, &s);
        let v = EdwardsPoint::vartime_multiscalar_mul([c, s], [gamma, h]);

        challenge(&self.compressed, &h, &gamma, &u, &v) == c_bytes
    }
}

/// Maps arbitrary bytes to a curve point deterministically.
fn hash_to_curve(alpha: &[u8]) -> EdwardsPoint {
    let mut hasher = Sha512::new();
    hasher.update(DOMAIN_HASH_TO_CURVE);
    hasher.update(alpha);
    EdwardsPoint::nonspec_map_to_curve::<Sha512>(&hasher.finalize())
}

/// Computes the 16-byte proof challenge over the transcript points.
fn challenge(
    public: &[u8; VRF_PUBLIC_KEY_SIZE],
    h: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> [u8; CHALLENGE_SIZE] {
    let mut hasher = Sha512::new();
    hasher.update(DOMAIN_CHALLENGE);
    hasher.update(ED25519_BASEPOINT_POINT.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    hasher.update(public);
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    let hash = hasher.finalize();

    let mut c = [0u8; CHALLENGE_SIZE];
    c.copy_from_slice(&hash[..CHALLENGE_SIZE]);
    c
}

/// Widens the 16-byte challenge into a scalar.
fn challenge_scalar(c: &[u8; CHALLENGE_SIZE]) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[..CHALLENGE_SIZE].copy_from_slice(c);
    Scalar::from_bytes_mod_order(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prove_verify_round_trip() {
        let key = VrfSecretKey::from_seed(&[42u8; 32]);
        let proof = key.prove(b"epoch message");
        assert!(key.public_key().verify(b"epoch message", proof.as_ref()));
    }

    #[test]
    fn proof_is_deterministic() {
        let key = VrfSecretKey::from_seed(&[7u8; 32]);
        assert_eq!(key.prove(b"input"), key.prove(b"input"));
        assert_ne!(key.prove(b"input"), key.prove(b"other"));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key = VrfSecretKey::from_seed(&[1u8; 32]);
        let other = VrfSecretKey::from_seed(&[2u8; 32]);
        let proof = key.prove(b"input");
        assert!(!other.public_key().verify(b"input", proof.as_ref()));
    }

    #[test]
    fn wrong_input_fails_verification() {
        let key = VrfSecretKey::from_seed(&[1u8; 32]);
        let proof = key.prove(b"input");
        assert!(!key.public_key().verify(b"different", proof.as_ref()));
    }

    #[test]
    fn truncated_proof_fails_verification() {
        let key = VrfSecretKey::from_seed(&[1u8; 32]);
        let proof = key.prove(b"input");
        assert!(!key.public_key().verify(b"input", &proof.as_bytes()[1..]));
    }

    #[test]
    fn proof_is_eighty_bytes() {
        let key = VrfSecretKey::from_seed(&[9u8; 32]);
        assert_eq!(key.prove(b"x").as_bytes().len(), VRF_PROOF_SIZE);
    }

    #[test]
    fn public_key_round_trip() {
        let key = VrfSecretKey::from_seed(&[3u8; 32]);
        let bytes = key.public_key().to_bytes();
        let parsed = VrfPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(&parsed, key.public_key());
    }
}
