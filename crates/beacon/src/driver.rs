//! The beacon protocol driver.
//!
//! One [`ProtocolDriver`] instance lives for the lifetime of the node. For
//! each epoch boundary the clock announces, it runs a protocol instance:
//!
//! 1. **Proposal phase** - collect VRF-proved proposals, broadcast our own
//!    if eligible, classify arrivals against the phase cutoff.
//! 2. **First voting round** - exchange full ballots over the classified
//!    proposals.
//! 3. **Following rounds** - exchange bit-vector votes; weighted margins
//!    accumulate per proposal.
//! 4. **Finalize** - hash the surviving proposals into the beacon for the
//!    next epoch.
//!
//! Ingress handlers (see the `handlers` module) run concurrently on
//! transport threads; two atomic flags (`running`, `in_protocol`) gate
//! admission, and all per-epoch state sits behind one read-write lock.
//!
//! Restarting mid-epoch abandons that epoch: no intermediate protocol
//! state is persisted anywhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use petram_core::{ActivationDb, EpochClock, Transport};
use petram_crypto::ecdsa::PrivateKey;
use petram_crypto::ecvrf::VrfSecretKey;
use petram_crypto::keccak256_concat;
use petram_types::{Beacon, EpochId, NodeId, RoundId, FIRST_ROUND};

use crate::checker::{ProposalChecker, Ratio};
use crate::config::{BeaconConfig, ConfigError};
use crate::messages::{
    proposal_vrf_message, topics, FirstVotingMessage, FollowingVotingMessage, ProposalMessage,
};
use crate::state::{EpochState, PendingProposal};
use crate::weight::{WeightError, WeightResolver};

/// Errors surfaced by the driver's public query surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeaconError {
    /// No beacon has been produced for the epoch (yet).
    #[error("beacon for epoch {0} is not ready")]
    NotReady(EpochId),
}

/// The two per-epoch state blocks the driver owns.
pub(crate) struct DriverStates {
    /// State of the epoch in progress.
    pub current: EpochState,
    /// Buffer for proposals arriving early for the next epoch. Only its
    /// proposal queue is used until the state is promoted.
    pub next: EpochState,
}

/// Drives the per-epoch random beacon protocol.
pub struct ProtocolDriver {
    pub(crate) config: BeaconConfig,
    pub(crate) q: Ratio,

    pub(crate) node_id: NodeId,
    pub(crate) signer: PrivateKey,
    pub(crate) vrf_signer: VrfSecretKey,

    pub(crate) db: Arc<dyn ActivationDb>,
    pub(crate) weight: WeightResolver,
    pub(crate) transport: Arc<dyn Transport>,
    clock: Arc<dyn EpochClock>,

    /// Cleared when the node is shutting down; handlers bail out early.
    pub(crate) running: AtomicBool,
    /// Set only while an epoch's protocol instance is active.
    pub(crate) in_protocol: AtomicBool,
    pub(crate) epoch_in_progress: AtomicU32,
    pub(crate) round_in_progress: AtomicU32,

    pub(crate) states: RwLock<DriverStates>,
    beacons: RwLock<HashMap<EpochId, Beacon>>,
    shutdown: Notify,
}

impl ProtocolDriver {
    /// Creates a driver.
    ///
    /// Validates the configuration and derives the node's identity from
    /// its key material. The driver does nothing until [`Self::run`] is
    /// spawned.
    pub fn new(
        config: BeaconConfig,
        signer: PrivateKey,
        vrf_signer: VrfSecretKey,
        db: Arc<dyn ActivationDb>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn EpochClock>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let q = Ratio::parse(&config.q).ok_or_else(|| ConfigError::InvalidRatio(config.q.clone()))?;

        let node_id = NodeId::new(
            signer.public_key().to_bytes(),
            vrf_signer.public_key().to_bytes(),
        );
        let capacity = config.proposal_chan_capacity;

        Ok(Arc::new(Self {
            config,
            q,
            node_id,
            signer,
            vrf_signer,
            weight: WeightResolver::new(Arc::clone(&db)),
            db,
            transport,
            clock,
            running: AtomicBool::new(true),
            in_protocol: AtomicBool::new(false),
            epoch_in_progress: AtomicU32::new(0),
            round_in_progress: AtomicU32::new(FIRST_ROUND),
            states: RwLock::new(DriverStates {
                current: EpochState::new(capacity),
                next: EpochState::new(capacity),
            }),
            beacons: RwLock::new(HashMap::new()),
            shutdown: Notify::new(),
        }))
    }

    /// This node's identity in the protocol.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Returns the beacon agreed for `epoch`.
    ///
    /// The protocol instance of epoch `e` produces the beacon for `e + 1`;
    /// until that instance finishes (or if no proposal survived voting),
    /// this reports [`BeaconError::NotReady`] and callers fall back to
    /// their own policy.
    pub fn beacon(&self, epoch: EpochId) -> Result<Beacon, BeaconError> {
        self.beacons
            .read()
            .get(&epoch)
            .copied()
            .ok_or(BeaconError::NotReady(epoch))
    }

    /// Signals shutdown: ingress is refused immediately and the epoch loop
    /// winds down.
    pub fn stop(&self) {
        info!("stopping beacon protocol driver");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_in_protocol(&self) -> bool {
        self.in_protocol.load(Ordering::Acquire)
    }

    pub(crate) fn epoch_in_progress(&self) -> EpochId {
        EpochId::new(self.epoch_in_progress.load(Ordering::Acquire))
    }

    pub(crate) fn round_in_progress(&self) -> RoundId {
        self.round_in_progress.load(Ordering::Acquire)
    }

    pub(crate) fn set_round_in_progress(&self, round: RoundId) {
        self.round_in_progress.store(round, Ordering::Release);
    }

    /// Runs the driver until [`Self::stop`] is called.
    ///
    /// Each epoch tick hard-cancels whatever remains of the previous
    /// epoch's instance and starts the next one.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let mut ticks = self.clock.subscribe();
        info!(epoch = %self.clock.current_epoch(), "beacon protocol driver started");

        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);

        let mut epoch_task: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                tick = ticks.recv() => match tick {
                    Ok(epoch) => {
                        if !self.is_running() {
                            break;
                        }
                        if let Some(task) = epoch_task.take() {
                            // Epoch boundary is a hard cancellation for
                            // whatever remains of the previous instance.
                            task.abort();
                            self.in_protocol.store(false, Ordering::SeqCst);
                        }
                        let driver = Arc::clone(&self);
                        epoch_task =
                            Some(tokio::spawn(async move { driver.run_epoch(epoch).await }));
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "epoch clock ticks missed; resynchronizing");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        if let Some(task) = epoch_task.take() {
            task.abort();
        }
        self.in_protocol.store(false, Ordering::SeqCst);
        info!("beacon protocol driver stopped");
    }

    /// Runs one epoch's protocol instance to completion.
    async fn run_epoch(&self, epoch: EpochId) {
        if !self.is_running() {
            return;
        }

        let total_weight = match self.db.epoch_total_weight(epoch) {
            Ok(weight) if weight > 0 => weight,
            Ok(_) => {
                warn!(epoch = %epoch, "epoch has no committed weight; sitting this epoch out");
                return;
            }
            Err(error) => {
                warn!(epoch = %epoch, %error, "failed to resolve epoch weight; sitting this epoch out");
                return;
            }
        };

        info!(epoch = %epoch, total_weight, "starting beacon protocol for epoch");
        self.epoch_in_progress.store(epoch.get(), Ordering::SeqCst);
        self.set_round_in_progress(FIRST_ROUND);
        self.in_protocol.store(true, Ordering::SeqCst);

        // Promote the buffered next-epoch state: proposals that arrived
        // early are waiting in its queue and drain below.
        let proposal_rx = {
            let mut states = self.states.write();
            states.current = std::mem::replace(
                &mut states.next,
                EpochState::new(self.config.proposal_chan_capacity),
            );
            states.current.proposal_checker = Some(ProposalChecker::new(total_weight, &self.q));
            states.current.take_proposal_receiver()
        };

        // A node without an activation for this epoch observes and tallies
        // but contributes no proposal or votes.
        let participating = match self.weight.voting_weight(&self.node_id, epoch) {
            Ok((_, weight)) => {
                debug!(epoch = %epoch, weight, "participating in epoch");
                true
            }
            Err(WeightError::AtxNotFound) => {
                info!(epoch = %epoch, "no activation for this epoch; observing only");
                false
            }
            Err(error) => {
                warn!(epoch = %epoch, %error, "could not resolve own weight; observing only");
                false
            }
        };

        self.run_proposal_phase(epoch, proposal_rx, participating)
            .await;
        self.run_first_voting_round(epoch, participating).await;
        self.run_following_rounds(epoch, participating).await;
        self.finalize(epoch);

        // Destroy the epoch's state; nothing outlives the instance.
        {
            let mut states = self.states.write();
            states.current = EpochState::new(self.config.proposal_chan_capacity);
        }
        self.in_protocol.store(false, Ordering::SeqCst);
        debug!(epoch = %epoch, "epoch protocol instance finished");
    }

    /// Proposal phase: broadcast our proposal, drain and classify inbound
    /// ones. After the deadline the cutoff is recorded and intake
    /// continues through the grace period, so stragglers still land as
    /// potentially valid.
    async fn run_proposal_phase(
        &self,
        epoch: EpochId,
        mut proposal_rx: Option<mpsc::Receiver<PendingProposal>>,
        participating: bool,
    ) {
        debug!(epoch = %epoch, "proposal phase started");
        if participating {
            self.broadcast_own_proposal(epoch).await;
        }

        self.drain_proposals_until(
            &mut proposal_rx,
            Instant::now() + self.config.proposal_duration(),
        )
        .await;

        {
            let mut states = self.states.write();
            states.current.mark_proposal_phase_finished(Instant::now());
        }
        debug!(epoch = %epoch, "proposal phase deadline reached; grace period started");

        self.drain_proposals_until(
            &mut proposal_rx,
            Instant::now() + self.config.grace_period_duration(),
        )
        .await;

        // Whatever is still queued was received before intake stopped.
        if let Some(rx) = proposal_rx.as_mut() {
            while let Ok(pending) = rx.try_recv() {
                self.classify_pending(pending);
            }
        }
    }

    /// Classifies queued proposals until `deadline`.
    async fn drain_proposals_until(
        &self,
        proposal_rx: &mut Option<mpsc::Receiver<PendingProposal>>,
        deadline: Instant,
    ) {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let Some(rx) = proposal_rx.as_mut() else {
            sleep.await;
            return;
        };

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                pending = rx.recv() => match pending {
                    Some(pending) => self.classify_pending(pending),
                    None => {
                        (&mut sleep).await;
                        break;
                    }
                },
            }
        }
    }

    fn classify_pending(&self, pending: PendingProposal) {
        let PendingProposal {
            message,
            received_at,
        } = pending;
        let miner = message.node_id;
        if let Err(error) = self.handle_proposal_message(message, received_at) {
            debug!(%miner, %error, "proposal message not accepted");
        }
    }

    /// Builds, broadcasts, and self-applies our proposal for `epoch` if it
    /// passes the eligibility threshold.
    async fn broadcast_own_proposal(&self, epoch: EpochId) {
        let proof = self.vrf_signer.prove(&proposal_vrf_message(epoch));

        let eligible = {
            let states = self.states.read();
            states
                .current
                .proposal_checker
                .as_ref()
                .map(|checker| checker.is_proposal_eligible(proof.as_ref()))
                .unwrap_or(false)
        };
        if !eligible {
            debug!(epoch = %epoch, "own proposal below eligibility threshold; not broadcasting");
            return;
        }

        let message = ProposalMessage {
            node_id: self.node_id,
            epoch,
            vrf_signature: proof.to_vec(),
        };
        info!(epoch = %epoch, "broadcasting own beacon proposal");
        if let Err(error) = self
            .transport
            .broadcast(topics::PROPOSAL, &message.encode())
            .await
        {
            warn!(epoch = %epoch, %error, "failed to broadcast proposal");
        }

        // Our proposal goes through the same pipeline as everyone else's.
        if let Err(error) = self.handle_proposal_message(message, Instant::now()) {
            warn!(epoch = %epoch, %error, "own proposal was not accepted");
        }
    }

    /// First voting round: broadcast our ballot over the classified
    /// proposals, then wait out the round.
    async fn run_first_voting_round(&self, epoch: EpochId, participating: bool) {
        debug!(epoch = %epoch, round = FIRST_ROUND, "first voting round started");

        if participating {
            let (valid, potentially_valid) = {
                let states = self.states.read();
                states.current.own_first_round_ballot()
            };

            let mut message = FirstVotingMessage {
                epoch,
                valid_proposals: valid,
                potentially_valid_proposals: potentially_valid,
                signature: Vec::new(),
            };
            match self.signer.sign(&message.signed_body()) {
                Ok(signature) => {
                    message.signature = signature.as_bytes().to_vec();
                    if let Err(error) = self
                        .transport
                        .broadcast(topics::FIRST_VOTES, &message.encode())
                        .await
                    {
                        warn!(epoch = %epoch, %error, "failed to broadcast first-round vote");
                    }
                    if let Err(error) = self.handle_first_voting_message(message) {
                        warn!(epoch = %epoch, %error, "own first-round vote was not accepted");
                    }
                }
                Err(error) => warn!(epoch = %epoch, %error, "failed to sign first-round vote"),
            }
        }

        tokio::time::sleep(self.config.first_voting_round_duration()).await;
    }

    /// Rounds `1..=K`: broadcast our bit-vector vote each round, then wait
    /// out the round. The round counter only ever advances.
    async fn run_following_rounds(&self, epoch: EpochId, participating: bool) {
        for round in 1..=self.config.rounds_number {
            self.set_round_in_progress(round);
            debug!(epoch = %epoch, round, "voting round started");

            if participating {
                self.broadcast_own_following_vote(epoch, round).await;
            }
            tokio::time::sleep(self.config.voting_round_duration()).await;
        }
    }

    /// Votes for every own-ballot proposal whose running margin is
    /// non-negative, against the rest.
    async fn broadcast_own_following_vote(&self, epoch: EpochId, round: RoundId) {
        let bits = {
            let states = self.states.read();
            match states.current.first_round_vote(&self.node_id.signing_key) {
                Some(ballot) => states.current.own_bit_vector(ballot),
                None => {
                    debug!(epoch = %epoch, round, "no own first-round ballot; not voting");
                    return;
                }
            }
        };

        let mut message = FollowingVotingMessage {
            epoch,
            round,
            votes_bit_vector: bits,
            signature: Vec::new(),
        };
        match self.signer.sign(&message.signed_body()) {
            Ok(signature) => message.signature = signature.as_bytes().to_vec(),
            Err(error) => {
                warn!(epoch = %epoch, round, %error, "failed to sign following vote");
                return;
            }
        }

        if let Err(error) = self
            .transport
            .broadcast(topics::FOLLOWING_VOTES, &message.encode())
            .await
        {
            warn!(epoch = %epoch, round, %error, "failed to broadcast following vote");
        }
        if let Err(error) = self.handle_following_voting_message(message) {
            warn!(epoch = %epoch, round, %error, "own following vote was not accepted");
        }
    }

    /// Derives the beacon from the proposals that survived voting and
    /// records it for the next epoch.
    fn finalize(&self, epoch: EpochId) {
        let survivors = {
            let states = self.states.read();
            states.current.surviving_proposals()
        };

        if survivors.is_empty() {
            warn!(epoch = %epoch, "no proposal survived voting; beacon not produced");
            return;
        }

        let beacon = Beacon::new(keccak256_concat(survivors.iter()));
        let target = epoch.next();
        self.beacons.write().insert(target, beacon);
        info!(
            epoch = %epoch,
            target_epoch = %target,
            %beacon,
            survivors = survivors.len(),
            "beacon computed"
        );
    }
}
