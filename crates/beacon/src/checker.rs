//! Proposal eligibility threshold.
//!
//! Not every miner with an activation may nominate a beacon proposal: a
//! VRF proof qualifies only when, read as a big-endian unsigned integer,
//! it falls strictly below the epoch's threshold `τ = ceil(W * q)`, where
//! `W` is the epoch's total committed weight and `q` the configured
//! eligibility ratio. The comparison spans the full 80-byte proof, so the
//! threshold arithmetic runs on arbitrary-precision integers.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// A positive rational number, parsed from a `"numerator/denominator"`
/// configuration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratio {
    numer: BigUint,
    denom: BigUint,
}

impl Ratio {
    /// Parses a ratio from `"a/b"` (or just `"a"`, meaning `a/1`).
    ///
    /// Returns `None` when either part fails to parse, the numerator is
    /// zero, or the denominator is zero.
    pub fn parse(s: &str) -> Option<Self> {
        let (numer, denom) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (s.trim().parse().ok()?, BigUint::one()),
        };
        if BigUint::is_zero(&numer) || BigUint::is_zero(&denom) {
            return None;
        }
        Some(Self { numer, denom })
    }
}

/// Decides whether a VRF proof qualifies as a beacon proposal.
///
/// Constructed once per epoch from the epoch's total weight; handlers
/// query it for every incoming proposal.
#[derive(Debug, Clone)]
pub struct ProposalChecker {
    threshold: BigUint,
}

impl ProposalChecker {
    /// Builds a checker for an epoch with total weight `total_weight`.
    pub fn new(total_weight: u64, q: &Ratio) -> Self {
        Self {
            threshold: threshold(total_weight, q),
        }
    }

    /// Builds a checker with an explicit threshold.
    pub fn with_threshold(threshold: BigUint) -> Self {
        Self { threshold }
    }

    /// Returns whether the VRF proof passes the eligibility threshold.
    pub fn is_proposal_eligible(&self, vrf_proof: &[u8]) -> bool {
        BigUint::from_bytes_be(vrf_proof) < self.threshold
    }
}

/// `τ = ceil(W * q)`.
fn threshold(total_weight: u64, q: &Ratio) -> BigUint {
    let scaled = BigUint::from(total_weight) * &q.numer;
    (scaled + &q.denom - BigUint::one()) / &q.denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(s: &str) -> Ratio {
        Ratio::parse(s).unwrap()
    }

    #[test]
    fn parse_accepts_fractions_and_integers() {
        assert!(Ratio::parse("1/3").is_some());
        assert!(Ratio::parse("7").is_some());
        assert!(Ratio::parse(" 2 / 5 ").is_some());
    }

    #[test]
    fn parse_rejects_zero_and_garbage() {
        for s in ["0/3", "1/0", "", "x", "1/2/3", "-1/3"] {
            assert!(Ratio::parse(s).is_none(), "{s:?} should not parse");
        }
    }

    #[test]
    fn threshold_is_ceiling() {
        // W = 10, q = 1/3 -> ceil(10/3) = 4
        assert_eq!(threshold(10, &ratio("1/3")), BigUint::from(4u32));
        // W = 9, q = 1/3 -> exactly 3
        assert_eq!(threshold(9, &ratio("1/3")), BigUint::from(3u32));
        // W = 0 -> 0: nothing is eligible
        assert_eq!(threshold(0, &ratio("1/3")), BigUint::from(0u32));
    }

    #[test]
    fn eligibility_is_strictly_below_threshold() {
        // τ = 4; values as big-endian integers
        let checker = ProposalChecker::new(10, &ratio("1/3"));
        assert!(checker.is_proposal_eligible(&[3]));
        assert!(!checker.is_proposal_eligible(&[4]));
        assert!(!checker.is_proposal_eligible(&[5]));
        // Leading zeros do not change the value.
        assert!(checker.is_proposal_eligible(&[0, 0, 3]));
    }

    #[test]
    fn zero_weight_epoch_accepts_nothing() {
        let checker = ProposalChecker::new(0, &ratio("1/3"));
        assert!(!checker.is_proposal_eligible(&[0]));
    }

    #[test]
    fn full_width_proofs_compare_as_integers() {
        // A threshold larger than any 80-byte value accepts everything.
        let huge = BigUint::from(1u8) << 700;
        let checker = ProposalChecker::with_threshold(huge);
        assert!(checker.is_proposal_eligible(&[0xff; 80]));
    }
}
