//! End-to-end protocol tests.
//!
//! These run several drivers against an in-memory gossip hub, a shared
//! activation store, and a manually ticked epoch clock, and check that the
//! network converges on a single beacon.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::broadcast;

use petram_beacon::{topics, BeaconConfig, BeaconError, ProtocolDriver};
use petram_core::{
    ActivationDb, ActivationError, ActivationResult, EpochClock, PeerId, Transport,
    TransportResult,
};
use petram_crypto::ecdsa::PrivateKey;
use petram_crypto::ecvrf::VrfSecretKey;
use petram_crypto::keccak256;
use petram_types::{ActivationHeader, AtxId, EpochId, NodeId};

/// In-memory activation store shared by every node in the test network.
struct SharedDb {
    atxs: HashMap<NodeId, AtxId>,
    headers: HashMap<AtxId, ActivationHeader>,
}

impl SharedDb {
    fn new() -> Self {
        Self {
            atxs: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    fn add_miner(&mut self, node: NodeId, weight: u64) {
        let atx = AtxId::new(keccak256(&node.signing_key));
        self.atxs.insert(node, atx);
        self.headers.insert(
            atx,
            ActivationHeader {
                start_tick: 0,
                end_tick: weight,
                num_units: 1,
            },
        );
    }
}

impl ActivationDb for SharedDb {
    fn node_atx_for_epoch(&self, node: &NodeId, _: EpochId) -> ActivationResult<AtxId> {
        self.atxs.get(node).copied().ok_or(ActivationError::NotFound)
    }

    fn atx_header(&self, id: &AtxId) -> ActivationResult<ActivationHeader> {
        self.headers.get(id).copied().ok_or(ActivationError::NotFound)
    }

    fn atx_timestamp(&self, _: &AtxId) -> ActivationResult<SystemTime> {
        Ok(SystemTime::UNIX_EPOCH)
    }

    fn epoch_total_weight(&self, _: EpochId) -> ActivationResult<u64> {
        Ok(self.headers.values().map(|h| h.weight()).sum())
    }
}

/// In-memory gossip hub: broadcast delivers to every registered driver,
/// then once more after a short delay (gossip redundancy; duplicate
/// deliveries are deduplicated by the protocol itself).
#[derive(Default)]
struct Hub {
    drivers: RwLock<Vec<Arc<ProtocolDriver>>>,
}

impl Hub {
    fn register(&self, driver: Arc<ProtocolDriver>) {
        self.drivers.write().unwrap().push(driver);
    }

    fn deliver(drivers: &[Arc<ProtocolDriver>], topic: &str, data: &[u8]) {
        let peer = PeerId::from_bytes(&b"hub"[..]);
        for driver in drivers {
            if topic == topics::PROPOSAL {
                driver.handle_proposal(&peer, data);
            } else if topic == topics::FIRST_VOTES {
                driver.handle_first_vote(&peer, data);
            } else if topic == topics::FOLLOWING_VOTES {
                driver.handle_following_vote(&peer, data);
            }
        }
    }
}

#[async_trait]
impl Transport for Hub {
    async fn broadcast(&self, topic: &str, data: &[u8]) -> TransportResult<()> {
        let drivers: Vec<_> = self.drivers.read().unwrap().clone();
        Hub::deliver(&drivers, topic, data);

        let topic = topic.to_string();
        let data = data.to_vec();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Hub::deliver(&drivers, &topic, &data);
        });
        Ok(())
    }
}

/// A clock ticked explicitly by the test.
struct ManualClock {
    epoch: AtomicU32,
    tx: broadcast::Sender<EpochId>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(8);
        Arc::new(Self {
            epoch: AtomicU32::new(0),
            tx,
        })
    }

    fn tick(&self, epoch: EpochId) {
        self.epoch.store(epoch.get(), Ordering::SeqCst);
        let _ = self.tx.send(epoch);
    }
}

impl EpochClock for ManualClock {
    fn current_epoch(&self) -> EpochId {
        EpochId::new(self.epoch.load(Ordering::SeqCst))
    }

    fn subscribe(&self) -> broadcast::Receiver<EpochId> {
        self.tx.subscribe()
    }
}

/// Network-scale config: every VRF proof passes the eligibility threshold
/// (q is astronomically large) and phases last long enough to absorb test
/// scheduling jitter.
fn net_config() -> BeaconConfig {
    BeaconConfig {
        q: format!("1{}", "0".repeat(200)),
        rounds_number: 2,
        proposal_duration_ms: 100,
        grace_period_duration_ms: 30,
        first_voting_round_duration_ms: 150,
        voting_round_duration_ms: 100,
        proposal_chan_capacity: 100,
    }
}

fn keys(index: u8) -> (PrivateKey, VrfSecretKey) {
    (
        PrivateKey::from_bytes(&[index + 1; 32]).unwrap(),
        VrfSecretKey::from_seed(&[index + 101; 32]),
    )
}

fn node_id(signer: &PrivateKey, vrf: &VrfSecretKey) -> NodeId {
    NodeId::new(signer.public_key().to_bytes(), vrf.public_key().to_bytes())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn network_agrees_on_one_beacon() {
    let epoch = EpochId::new(10);

    // Three participating miners plus one observer without an activation.
    let miners: Vec<_> = (0..3).map(keys).collect();
    let observer = keys(9);

    let mut db = SharedDb::new();
    for (signer, vrf) in &miners {
        db.add_miner(node_id(signer, vrf), 10);
    }
    let db = Arc::new(db);

    let hub = Arc::new(Hub::default());
    let clock = ManualClock::new();

    let mut drivers = Vec::new();
    for (signer, vrf) in miners.into_iter().chain([observer]) {
        let driver = ProtocolDriver::new(
            net_config(),
            signer,
            vrf,
            Arc::clone(&db) as Arc<dyn ActivationDb>,
            Arc::clone(&hub) as Arc<dyn Transport>,
            Arc::clone(&clock) as Arc<dyn EpochClock>,
        )
        .unwrap();
        hub.register(Arc::clone(&driver));
        drivers.push(driver);
    }

    let mut tasks = Vec::new();
    for driver in &drivers {
        tasks.push(tokio::spawn(Arc::clone(driver).run()));
    }

    // Let every driver subscribe to the clock before the boundary fires.
    tokio::time::sleep(Duration::from_millis(100)).await;
    clock.tick(epoch);

    // Nothing is ready mid-protocol for the target epoch's beacon.
    assert_eq!(
        drivers[0].beacon(epoch.next()),
        Err(BeaconError::NotReady(epoch.next()))
    );

    // Proposal phase + grace + first round + two following rounds, with
    // ample slack.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let beacon = drivers[0]
        .beacon(epoch.next())
        .expect("protocol run should produce a beacon");
    for driver in &drivers[1..] {
        assert_eq!(driver.beacon(epoch.next()), Ok(beacon), "nodes disagree");
    }

    // The epoch the protocol ran in has no beacon of its own.
    assert_eq!(
        drivers[0].beacon(epoch),
        Err(BeaconError::NotReady(epoch))
    );

    for driver in &drivers {
        driver.stop();
    }
    for task in tasks {
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}

#[tokio::test]
async fn beacon_is_not_ready_without_a_protocol_run() {
    let (signer, vrf) = keys(0);
    let mut db = SharedDb::new();
    db.add_miner(node_id(&signer, &vrf), 10);

    let driver = ProtocolDriver::new(
        net_config(),
        signer,
        vrf,
        Arc::new(db) as Arc<dyn ActivationDb>,
        Arc::new(Hub::default()) as Arc<dyn Transport>,
        ManualClock::new() as Arc<dyn EpochClock>,
    )
    .unwrap();

    assert_eq!(
        driver.beacon(EpochId::new(11)),
        Err(BeaconError::NotReady(EpochId::new(11)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_terminates_the_driver_and_refuses_ingress() {
    let (signer, vrf) = keys(0);
    let mut db = SharedDb::new();
    db.add_miner(node_id(&signer, &vrf), 10);

    let clock = ManualClock::new();
    let driver = ProtocolDriver::new(
        net_config(),
        signer,
        vrf,
        Arc::new(db) as Arc<dyn ActivationDb>,
        Arc::new(Hub::default()) as Arc<dyn Transport>,
        Arc::clone(&clock) as Arc<dyn EpochClock>,
    )
    .unwrap();

    let task = tokio::spawn(Arc::clone(&driver).run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    driver.stop();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("run loop should exit after stop")
        .unwrap();

    // Ingress after shutdown is silently ignored.
    use petram_beacon::{proposal_vrf_message, ProposalMessage};
    use petram_core::GossipVerdict;

    let (other_signer, other_vrf) = keys(1);
    let message = ProposalMessage {
        node_id: node_id(&other_signer, &other_vrf),
        epoch: EpochId::new(0),
        vrf_signature: other_vrf
            .prove(&proposal_vrf_message(EpochId::new(0)))
            .to_vec(),
    };
    let peer = PeerId::from_bytes(&b"peer"[..]);
    assert_eq!(
        driver.handle_proposal(&peer, &message.encode()),
        GossipVerdict::Ignore
    );
}
