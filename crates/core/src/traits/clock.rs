//! Epoch clock interface.
//!
//! The beacon driver is time-driven: it starts one protocol instance per
//! epoch boundary. The clock seam exposes the current epoch and a
//! subscription yielding the id of each epoch as it begins. Round
//! boundaries inside an epoch are plain timer sleeps and do not go through
//! the clock.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use petram_types::EpochId;

/// Source of epoch boundary ticks.
pub trait EpochClock: Send + Sync + 'static {
    /// Returns the epoch the wall clock is currently in.
    fn current_epoch(&self) -> EpochId;

    /// Subscribes to epoch boundaries.
    ///
    /// The receiver yields the id of each new epoch at the instant it
    /// starts. Slow subscribers may observe lagged receives and should
    /// resynchronize via [`EpochClock::current_epoch`].
    fn subscribe(&self) -> broadcast::Receiver<EpochId>;
}

/// A wall-clock driven epoch ticker.
///
/// Epochs have a fixed duration measured from a genesis instant. A
/// background task broadcasts each boundary as it is reached.
pub struct SystemClock {
    genesis: Instant,
    epoch_duration: Duration,
    tx: broadcast::Sender<EpochId>,
}

impl SystemClock {
    /// Creates a clock and starts its ticker task.
    ///
    /// `genesis` is the start instant of epoch 0.
    pub fn start(genesis: Instant, epoch_duration: Duration) -> std::sync::Arc<Self> {
        assert!(!epoch_duration.is_zero(), "epoch duration must be nonzero");
        let (tx, _) = broadcast::channel(4);
        let clock = std::sync::Arc::new(Self {
            genesis,
            epoch_duration,
            tx,
        });

        let ticker = std::sync::Arc::clone(&clock);
        tokio::spawn(async move {
            loop {
                let next = ticker.current_epoch().next();
                let boundary = ticker.genesis + ticker.epoch_duration * next.get();
                tokio::time::sleep_until(boundary).await;
                debug!(epoch = %next, "epoch boundary");
                // No receivers is fine; the driver may not be running yet.
                let _ = ticker.tx.send(next);
            }
        });

        clock
    }
}

impl EpochClock for SystemClock {
    fn current_epoch(&self) -> EpochId {
        let elapsed = Instant::now().saturating_duration_since(self.genesis);
        let epochs = elapsed.as_nanos() / self.epoch_duration.as_nanos();
        EpochId::new(epochs.min(u128::from(u32::MAX)) as u32)
    }

    fn subscribe(&self) -> broadcast::Receiver<EpochId> {
        self.tx.subscribe()
    }
}
