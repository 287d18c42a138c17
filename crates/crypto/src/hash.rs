//! Keccak256 hashing.
//!
//! All digests in the beacon protocol (message prehashes, the final beacon
//! value) use Keccak256.

use sha3::{Digest, Keccak256};

/// Computes the Keccak256 hash of the input data.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the Keccak256 hash of multiple concatenated inputs.
///
/// Equivalent to hashing the concatenation of `parts` without allocating
/// an intermediate buffer.
#[inline]
pub fn keccak256_concat<I, P>(parts: I) -> [u8; 32]
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn concat_matches_single_shot() {
        let direct = keccak256(b"hello world");
        let concat = keccak256_concat([&b"hello"[..], b" ", b"world"]);
        assert_eq!(direct, concat);
    }

    #[test]
    fn deterministic() {
        assert_eq!(keccak256(b"beacon"), keccak256(b"beacon"));
    }
}
