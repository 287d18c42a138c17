//! Per-epoch protocol state.
//!
//! The driver owns two of these: one for the epoch in progress and one
//! buffering early proposals for the next epoch. A state is created on
//! epoch entry and destroyed on epoch exit; nothing survives a restart.

use std::collections::{BTreeSet, HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::time::Instant;

use petram_types::{RoundId, SigningKeyBytes, VrfKeyBytes};

use crate::checker::ProposalChecker;
use crate::messages::ProposalMessage;

/// A proposal awaiting classification, stamped with its arrival time.
#[derive(Debug)]
pub(crate) struct PendingProposal {
    pub message: ProposalMessage,
    pub received_at: Instant,
}

/// Classified proposals, each an ordered set of proposal byte strings.
///
/// Ordering is lexicographic, which every node computes identically; the
/// canonical first-round ballot is the concatenation `[valid |
/// potentially_valid]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Proposals {
    pub valid: BTreeSet<Vec<u8>>,
    pub potentially_valid: BTreeSet<Vec<u8>>,
}

/// Mutable state of one epoch's protocol instance.
pub(crate) struct EpochState {
    /// Sender half of the bounded proposal intake queue.
    proposal_tx: mpsc::Sender<PendingProposal>,
    /// Receiver half; taken by the driver's epoch task when draining.
    proposal_rx: Option<mpsc::Receiver<PendingProposal>>,

    /// VRF keys that have already contributed a proposal this epoch.
    pub has_proposed: HashSet<VrfKeyBytes>,
    /// Classified incoming proposals.
    pub incoming_proposals: Proposals,
    /// Each miner's first-round ballot, keyed by signing key. The ballot
    /// is the index space for that miner's later bit-vector votes.
    pub first_round_votes: HashMap<SigningKeyBytes, Vec<Vec<u8>>>,
    /// Signing keys that have voted, per round.
    pub has_voted: HashMap<RoundId, HashSet<SigningKeyBytes>>,
    /// Cumulative signed weighted margin per proposal.
    pub votes_margin: HashMap<Vec<u8>, i128>,
    /// When the proposal phase ended; unset while it is still open.
    pub proposal_phase_finished_at: Option<Instant>,
    /// Eligibility checker for this epoch, set once total weight is known.
    pub proposal_checker: Option<ProposalChecker>,
}

impl EpochState {
    /// Creates a fresh state with a proposal queue of the given capacity.
    pub fn new(proposal_chan_capacity: usize) -> Self {
        let (proposal_tx, proposal_rx) = mpsc::channel(proposal_chan_capacity);
        Self {
            proposal_tx,
            proposal_rx: Some(proposal_rx),
            has_proposed: HashSet::new(),
            incoming_proposals: Proposals::default(),
            first_round_votes: HashMap::new(),
            has_voted: HashMap::new(),
            votes_margin: HashMap::new(),
            proposal_phase_finished_at: None,
            proposal_checker: None,
        }
    }

    /// Enqueues a proposal without blocking.
    ///
    /// Returns `false` when the queue is full (the message is dropped:
    /// back-pressure, not buffering) or the receiver is gone.
    pub fn enqueue_proposal(&self, pending: PendingProposal) -> bool {
        self.proposal_tx.try_send(pending).is_ok()
    }

    /// Number of proposals currently queued.
    pub fn queued_proposals(&self) -> usize {
        self.proposal_tx.max_capacity() - self.proposal_tx.capacity()
    }

    /// Takes the receiver half of the proposal queue.
    ///
    /// The epoch task takes it once at the start of the proposal phase so
    /// it can drain without holding the state lock.
    pub fn take_proposal_receiver(&mut self) -> Option<mpsc::Receiver<PendingProposal>> {
        self.proposal_rx.take()
    }

    /// Marks the proposal-phase cutoff. Set-once: later calls are ignored.
    pub fn mark_proposal_phase_finished(&mut self, at: Instant) {
        self.proposal_phase_finished_at.get_or_insert(at);
    }

    /// Records that a VRF key contributed a proposal.
    ///
    /// Returns `false` when the key had already proposed this epoch.
    pub fn register_proposed(&mut self, vrf_key: VrfKeyBytes) -> bool {
        self.has_proposed.insert(vrf_key)
    }

    /// Records that a signing key voted in `round`.
    ///
    /// Returns `false` when the key had already voted in that round.
    pub fn register_voted(&mut self, round: RoundId, signer: SigningKeyBytes) -> bool {
        self.has_voted.entry(round).or_default().insert(signer)
    }

    /// Stores a miner's first-round ballot.
    pub fn set_first_round_vote(&mut self, signer: SigningKeyBytes, ballot: Vec<Vec<u8>>) {
        self.first_round_votes.insert(signer, ballot);
    }

    /// Returns a miner's recorded first-round ballot.
    pub fn first_round_vote(&self, signer: &SigningKeyBytes) -> Option<&Vec<Vec<u8>>> {
        self.first_round_votes.get(signer)
    }

    /// The canonical first-round ballot over this node's classified
    /// proposals: `[valid | potentially_valid]` in set order.
    pub fn own_first_round_ballot(&self) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let valid: Vec<Vec<u8>> = self.incoming_proposals.valid.iter().cloned().collect();
        let potentially_valid: Vec<Vec<u8>> = self
            .incoming_proposals
            .potentially_valid
            .iter()
            .cloned()
            .collect();
        (valid, potentially_valid)
    }

    /// Applies a bit-vector vote of magnitude `weight` over `ballot`.
    ///
    /// Bit `j` set adds `+weight` to the margin of `ballot[j]`, clear (or
    /// missing, for short vectors) subtracts it. Additions saturate; the
    /// margin map is commutative over vote application order.
    pub fn apply_vote_margins(&mut self, ballot: &[Vec<u8>], bits: &[u8], weight: u64) {
        for (index, proposal) in ballot.iter().enumerate() {
            let margin = self.votes_margin.entry(proposal.clone()).or_insert(0);
            if bit_set(bits, index) {
                *margin = margin.saturating_add(i128::from(weight));
            } else {
                *margin = margin.saturating_sub(i128::from(weight));
            }
        }
    }

    /// Builds this node's bit vector over `ballot` from the running tally:
    /// bit `j` is set when `ballot[j]` currently has a non-negative margin.
    pub fn own_bit_vector(&self, ballot: &[Vec<u8>]) -> Vec<u8> {
        let mut bits = vec![0u8; ballot.len().div_ceil(8)];
        for (index, proposal) in ballot.iter().enumerate() {
            let margin = self.votes_margin.get(proposal).copied().unwrap_or(0);
            if margin >= 0 {
                bits[index / 8] |= 1 << (index % 8);
            }
        }
        bits
    }

    /// The proposals that survived voting: non-negative margin, in
    /// lexicographic order.
    pub fn surviving_proposals(&self) -> Vec<Vec<u8>> {
        let mut survivors: Vec<Vec<u8>> = self
            .votes_margin
            .iter()
            .filter(|(_, margin)| **margin >= 0)
            .map(|(proposal, _)| proposal.clone())
            .collect();
        survivors.sort();
        survivors
    }
}

/// Reads bit `index` of a little-endian bit vector (LSB of byte 0 first).
fn bit_set(bits: &[u8], index: usize) -> bool {
    bits.get(index / 8)
        .map(|byte| byte >> (index % 8) & 1 == 1)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(epoch: u32) -> PendingProposal {
        use petram_types::{EpochId, NodeId};
        PendingProposal {
            message: ProposalMessage {
                node_id: NodeId::new([0; 33], [0; 32]),
                epoch: EpochId::new(epoch),
                vrf_signature: vec![0; 80],
            },
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn queue_drops_when_full() {
        let state = EpochState::new(2);
        assert!(state.enqueue_proposal(pending(1)));
        assert!(state.enqueue_proposal(pending(1)));
        assert!(!state.enqueue_proposal(pending(1)));
        assert_eq!(state.queued_proposals(), 2);
    }

    #[test]
    fn dedup_sets_report_first_insert_only() {
        let mut state = EpochState::new(1);
        assert!(state.register_proposed([1; 32]));
        assert!(!state.register_proposed([1; 32]));

        assert!(state.register_voted(0, [2; 33]));
        assert!(!state.register_voted(0, [2; 33]));
        // Same key, different round: independent.
        assert!(state.register_voted(1, [2; 33]));
    }

    #[test]
    fn proposal_phase_cutoff_is_set_once() {
        let mut state = EpochState::new(1);
        let first = Instant::now();
        state.mark_proposal_phase_finished(first);
        state.mark_proposal_phase_finished(first + std::time::Duration::from_secs(5));
        assert_eq!(state.proposal_phase_finished_at, Some(first));
    }

    #[test]
    fn bit_vector_margins() {
        let mut state = EpochState::new(1);
        let ballot = vec![vec![0u8; 32], vec![1u8; 32], vec![2u8; 32]];

        // 0b101: for ballot[0] and ballot[2], against ballot[1].
        state.apply_vote_margins(&ballot, &[0b101], 10);

        assert_eq!(state.votes_margin[&ballot[0]], 10);
        assert_eq!(state.votes_margin[&ballot[1]], -10);
        assert_eq!(state.votes_margin[&ballot[2]], 10);
    }

    #[test]
    fn short_bit_vector_counts_missing_bits_against() {
        let mut state = EpochState::new(1);
        let ballot: Vec<Vec<u8>> = (0..9u8).map(|i| vec![i; 32]).collect();

        // One byte covers eight entries; the ninth has no bit and counts
        // as a vote against.
        state.apply_vote_margins(&ballot, &[0xff], 3);
        assert_eq!(state.votes_margin[&ballot[7]], 3);
        assert_eq!(state.votes_margin[&ballot[8]], -3);
    }

    #[test]
    fn margins_commute_over_vote_order() {
        let ballot = vec![vec![0u8; 32], vec![1u8; 32], vec![2u8; 32]];
        let votes: Vec<(&[u8], u64)> = vec![(&[0b101], 10), (&[0b010], 4), (&[0b111], 1)];

        let mut forward = EpochState::new(1);
        for (bits, weight) in &votes {
            forward.apply_vote_margins(&ballot, bits, *weight);
        }

        let mut reverse = EpochState::new(1);
        for (bits, weight) in votes.iter().rev() {
            reverse.apply_vote_margins(&ballot, bits, *weight);
        }

        assert_eq!(forward.votes_margin, reverse.votes_margin);
    }

    #[test]
    fn own_bit_vector_follows_margins() {
        let mut state = EpochState::new(1);
        let ballot = vec![vec![0u8; 32], vec![1u8; 32], vec![2u8; 32]];
        state.apply_vote_margins(&ballot, &[0b101], 10);

        // Margins are [+10, -10, +10]; untallied entries default to set.
        assert_eq!(state.own_bit_vector(&ballot), vec![0b101]);
    }

    #[test]
    fn survivors_are_sorted_and_nonnegative() {
        let mut state = EpochState::new(1);
        state.votes_margin.insert(vec![3u8; 4], 5);
        state.votes_margin.insert(vec![1u8; 4], 0);
        state.votes_margin.insert(vec![2u8; 4], -1);

        assert_eq!(
            state.surviving_proposals(),
            vec![vec![1u8; 4], vec![3u8; 4]]
        );
    }
}
