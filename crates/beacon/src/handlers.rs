//! Gossip ingress handlers.
//!
//! The transport layer invokes these concurrently with the driver's epoch
//! task. Each serialized handler performs admission (shutdown and
//! in-protocol gates, decode, epoch window) and returns only a
//! [`GossipVerdict`] for the substrate's re-propagation decision; the
//! message pipelines themselves live in the `handle_*_message` methods so
//! the driver can push its own messages through the identical path.
//!
//! Two orderings here are deliberate and load-bearing:
//!
//! - A voter is marked as having voted *before* its weight is resolved,
//!   so a miner whose activation lookup fails still cannot re-submit.
//!   This blunts lookup-driven replay amplification at the cost of being
//!   unforgiving to miners with flaky activation state.
//! - A proposer is registered in the dedup set before the eligibility
//!   threshold is checked, so an ineligible proposal still consumes the
//!   miner's one proposal slot for the epoch.

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use petram_core::{GossipVerdict, PeerId};
use petram_crypto::ecdsa::Signature;
use petram_crypto::ecvrf::VrfPublicKey;
use petram_types::{EpochId, NodeId, RoundId, BEACON_SIZE, FIRST_ROUND, VRF_KEY_SIZE};

use crate::driver::ProtocolDriver;
use crate::messages::{
    proposal_vrf_message, CodecError, FirstVotingMessage, FollowingVotingMessage, ProposalMessage,
};
use crate::state::PendingProposal;
use crate::weight::WeightError;

/// Outcome of processing one inbound message.
///
/// These never cross the gossip boundary directly; serialized handlers
/// collapse them to a [`GossipVerdict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The node is shutting down.
    #[error("node is shutting down")]
    Shutdown,

    /// No protocol instance is active between epochs.
    #[error("not in the beacon protocol")]
    NotInProtocol,

    /// The payload did not decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Message targets an epoch that already passed.
    #[error("epoch {message} is older than the epoch in progress {current}")]
    EpochTooOld {
        /// Epoch in the message.
        message: EpochId,
        /// Epoch in progress.
        current: EpochId,
    },

    /// Message targets an epoch beyond the buffering window.
    #[error("epoch {message} is too far ahead of the epoch in progress {current}")]
    EpochTooFarAhead {
        /// Epoch in the message.
        message: EpochId,
        /// Epoch in progress.
        current: EpochId,
    },

    /// The proposal queue is full; back-pressure drops the newcomer.
    #[error("proposal queue full")]
    QueueFull,

    /// A first-round vote arrived after the first round ended.
    #[error("first voting round is over (round {current} in progress)")]
    FirstVoteLate {
        /// Round in progress.
        current: RoundId,
    },

    /// A following vote for a round the driver has moved past.
    #[error("vote round {message} is older than round in progress {current}")]
    RoundTooOld {
        /// Round in the message.
        message: RoundId,
        /// Round in progress.
        current: RoundId,
    },

    /// A following vote for a round that has not started. Future-round
    /// votes are rejected outright, not buffered.
    #[error("vote round {message} has not started (round {current} in progress)")]
    RoundNotStarted {
        /// Round in the message.
        message: RoundId,
        /// Round in progress.
        current: RoundId,
    },

    /// The proposal's VRF proof failed verification.
    #[error("VRF signature did not verify")]
    VrfNotVerified,

    /// The vote signature is malformed or does not recover a key.
    #[error("bad signature format: {0}")]
    BadSignature(String),

    /// The VRF key already contributed a proposal this epoch.
    #[error("miner already proposed this epoch")]
    AlreadyProposed,

    /// The signer already voted in this round.
    #[error("miner already voted in this round")]
    AlreadyVoted,

    /// The proposal did not pass the eligibility threshold.
    #[error("proposal does not pass the eligibility threshold")]
    BelowThreshold,

    /// A following vote from a signer with no recorded first-round ballot.
    #[error("no first-round ballot recorded for voter")]
    NoFirstRoundBallot,

    /// Weight resolution failed; activation-store errors pass through.
    #[error(transparent)]
    Weight(#[from] WeightError),
}

impl HandlerError {
    /// The verdict reported to the gossip substrate for this outcome.
    ///
    /// Malformed or cryptographically invalid messages are rejected (the
    /// sender is misbehaving); everything else - duplicates, epoch/round
    /// windows, shutdown, missing activations - is ignored without
    /// penalty.
    fn verdict(&self) -> GossipVerdict {
        match self {
            HandlerError::Codec(_)
            | HandlerError::VrfNotVerified
            | HandlerError::BadSignature(_)
            | HandlerError::BelowThreshold => GossipVerdict::Reject,
            _ => GossipVerdict::Ignore,
        }
    }
}

impl ProtocolDriver {
    /// Handles a serialized beacon proposal from the gossip network.
    pub fn handle_proposal(&self, peer: &PeerId, data: &[u8]) -> GossipVerdict {
        match self.admit_proposal(data) {
            Ok(()) => GossipVerdict::Accept,
            Err(error) => {
                debug!(%peer, %error, "proposal message dropped");
                error.verdict()
            }
        }
    }

    /// Handles a serialized first-round vote from the gossip network.
    pub fn handle_first_vote(&self, peer: &PeerId, data: &[u8]) -> GossipVerdict {
        match self.admit_first_vote(data) {
            Ok(()) => GossipVerdict::Accept,
            Err(error) => {
                debug!(%peer, %error, "first-round vote dropped");
                error.verdict()
            }
        }
    }

    /// Handles a serialized following-round vote from the gossip network.
    pub fn handle_following_vote(&self, peer: &PeerId, data: &[u8]) -> GossipVerdict {
        match self.admit_following_vote(data) {
            Ok(()) => GossipVerdict::Accept,
            Err(error) => {
                debug!(%peer, %error, "following vote dropped");
                error.verdict()
            }
        }
    }

    /// Shutdown and in-protocol admission gates shared by all handlers.
    fn check_admission(&self) -> Result<(), HandlerError> {
        if !self.is_running() {
            return Err(HandlerError::Shutdown);
        }
        if !self.is_in_protocol() {
            return Err(HandlerError::NotInProtocol);
        }
        Ok(())
    }

    fn admit_proposal(&self, data: &[u8]) -> Result<(), HandlerError> {
        self.check_admission()?;
        let message = ProposalMessage::decode(data)?;
        let received_at = Instant::now();
        let current = self.epoch_in_progress();

        if message.epoch < current {
            return Err(HandlerError::EpochTooOld {
                message: message.epoch,
                current,
            });
        }
        if message.epoch == current {
            let states = self.states.read();
            if !states
                .current
                .enqueue_proposal(PendingProposal {
                    message,
                    received_at,
                })
            {
                return Err(HandlerError::QueueFull);
            }
            return Ok(());
        }
        if message.epoch == current.next() {
            // Buffer proposals for the imminent epoch; they drain once the
            // driver advances.
            let states = self.states.read();
            if !states
                .next
                .enqueue_proposal(PendingProposal {
                    message,
                    received_at,
                })
            {
                return Err(HandlerError::QueueFull);
            }
            return Ok(());
        }
        Err(HandlerError::EpochTooFarAhead {
            message: message.epoch,
            current,
        })
    }

    fn admit_first_vote(&self, data: &[u8]) -> Result<(), HandlerError> {
        self.check_admission()?;
        let message = FirstVotingMessage::decode(data)?;
        let current = self.epoch_in_progress();

        // Votes are only meaningful for the epoch in progress; unlike
        // proposals, early votes are not buffered.
        if message.epoch != current {
            return Err(if message.epoch < current {
                HandlerError::EpochTooOld {
                    message: message.epoch,
                    current,
                }
            } else {
                HandlerError::EpochTooFarAhead {
                    message: message.epoch,
                    current,
                }
            });
        }

        let round = self.round_in_progress();
        if round != FIRST_ROUND {
            return Err(HandlerError::FirstVoteLate { current: round });
        }

        self.handle_first_voting_message(message)
    }

    fn admit_following_vote(&self, data: &[u8]) -> Result<(), HandlerError> {
        self.check_admission()?;
        let message = FollowingVotingMessage::decode(data)?;
        let current = self.epoch_in_progress();

        if message.epoch != current {
            return Err(if message.epoch < current {
                HandlerError::EpochTooOld {
                    message: message.epoch,
                    current,
                }
            } else {
                HandlerError::EpochTooFarAhead {
                    message: message.epoch,
                    current,
                }
            });
        }

        self.handle_following_voting_message(message)
    }

    /// Proposal pipeline: VRF verification, membership and weight,
    /// dedup, eligibility, classification.
    pub(crate) fn handle_proposal_message(
        &self,
        message: ProposalMessage,
        received_at: Instant,
    ) -> Result<(), HandlerError> {
        let epoch = self.epoch_in_progress();
        let miner = message.node_id;

        let vrf_key =
            VrfPublicKey::from_bytes(&miner.vrf_key).ok_or(HandlerError::VrfNotVerified)?;
        if !vrf_key.verify(&proposal_vrf_message(epoch), &message.vrf_signature) {
            warn!(%miner, epoch = %epoch, "proposal VRF signature failed verification");
            return Err(HandlerError::VrfNotVerified);
        }

        let (atx_id, weight) = self.weight.voting_weight(&miner, epoch)?;

        // Publication instant of the activation backing this proposal;
        // lookup failures propagate like any other store error.
        let atx_received = self
            .db
            .atx_timestamp(&atx_id)
            .map_err(WeightError::Lookup)?;

        let mut states = self.states.write();
        if !states.current.register_proposed(miner.vrf_key) {
            return Err(HandlerError::AlreadyProposed);
        }

        let checker = states
            .current
            .proposal_checker
            .as_ref()
            .ok_or(HandlerError::NotInProtocol)?;
        if !checker.is_proposal_eligible(&message.vrf_signature) {
            debug!(%miner, epoch = %epoch, "proposal below eligibility threshold");
            return Err(HandlerError::BelowThreshold);
        }

        // The VRF proof verified, so it is full length; the proposal value
        // is its leading bytes.
        let proposal = message.vrf_signature[..BEACON_SIZE].to_vec();

        let late = matches!(
            states.current.proposal_phase_finished_at,
            Some(finished_at) if received_at > finished_at
        );
        if late {
            if !states.current.incoming_proposals.valid.contains(&proposal) {
                states
                    .current
                    .incoming_proposals
                    .potentially_valid
                    .insert(proposal);
            }
            debug!(%miner, epoch = %epoch, weight, atx_received = ?atx_received,
                "accepted potentially valid (late) proposal");
        } else {
            if !states
                .current
                .incoming_proposals
                .potentially_valid
                .contains(&proposal)
            {
                states.current.incoming_proposals.valid.insert(proposal);
            }
            debug!(%miner, epoch = %epoch, weight, atx_received = ?atx_received,
                "accepted valid proposal");
        }
        Ok(())
    }

    /// First-round vote pipeline: signer recovery, dedup, weight,
    /// ballot recording.
    pub(crate) fn handle_first_voting_message(
        &self,
        message: FirstVotingMessage,
    ) -> Result<(), HandlerError> {
        let epoch = self.epoch_in_progress();

        let signature = Signature::from_slice(&message.signature)
            .map_err(|e| HandlerError::BadSignature(e.to_string()))?;
        let public_key = signature
            .recover(&message.signed_body())
            .map_err(|e| HandlerError::BadSignature(e.to_string()))?;
        let signer = public_key.to_bytes();

        // Mark the voter before resolving weight: see module docs.
        {
            let mut states = self.states.write();
            if !states.current.register_voted(FIRST_ROUND, signer) {
                return Err(HandlerError::AlreadyVoted);
            }
        }

        let voter = NodeId::new(signer, [0u8; VRF_KEY_SIZE]);
        let (_, weight) = self.weight.voting_weight(&voter, epoch)?;

        let mut ballot = message.valid_proposals;
        ballot.extend(message.potentially_valid_proposals);

        let mut states = self.states.write();
        states.current.set_first_round_vote(signer, ballot);
        debug!(voter = %voter, epoch = %epoch, weight, "accepted first-round vote");
        Ok(())
    }

    /// Following-round vote pipeline: round gate, signer recovery, dedup,
    /// weight, margin application over the signer's own ballot.
    pub(crate) fn handle_following_voting_message(
        &self,
        message: FollowingVotingMessage,
    ) -> Result<(), HandlerError> {
        let epoch = self.epoch_in_progress();
        let current_round = self.round_in_progress();

        if message.round < current_round {
            return Err(HandlerError::RoundTooOld {
                message: message.round,
                current: current_round,
            });
        }
        if message.round > current_round {
            return Err(HandlerError::RoundNotStarted {
                message: message.round,
                current: current_round,
            });
        }

        let signature = Signature::from_slice(&message.signature)
            .map_err(|e| HandlerError::BadSignature(e.to_string()))?;
        let public_key = signature
            .recover(&message.signed_body())
            .map_err(|e| HandlerError::BadSignature(e.to_string()))?;
        let signer = public_key.to_bytes();

        // Mark the voter before resolving weight: see module docs.
        {
            let mut states = self.states.write();
            if !states.current.register_voted(message.round, signer) {
                return Err(HandlerError::AlreadyVoted);
            }
        }

        let voter = NodeId::new(signer, [0u8; VRF_KEY_SIZE]);
        let (_, weight) = self.weight.voting_weight(&voter, epoch)?;

        let mut states = self.states.write();
        let ballot = states
            .current
            .first_round_vote(&signer)
            .cloned()
            .ok_or(HandlerError::NoFirstRoundBallot)?;
        states
            .current
            .apply_vote_margins(&ballot, &message.votes_bit_vector, weight);
        debug!(
            voter = %voter,
            epoch = %epoch,
            round = message.round,
            weight,
            "accepted following vote"
        );
        Ok(())
    }
}
