//! Voting weight resolution.
//!
//! A miner's voting weight for an epoch comes from its activation for the
//! *previous* epoch: weight = `(end_tick - start_tick) * num_units` of the
//! activation header. Resolution chains two activation-store lookups and
//! distinguishes "the miner has no activation" (a protocol outcome) from
//! infrastructure failures (which propagate unchanged).

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use petram_core::{ActivationDb, ActivationError};
use petram_types::{AtxId, EpochId, NodeId};

/// Errors from weight resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeightError {
    /// The miner has no activation for the epoch preceding the protocol
    /// epoch, so it is not a member and carries no weight.
    #[error("miner has no activation for the previous epoch")]
    AtxNotFound,

    /// The miner's activation resolves to zero weight.
    #[error("activation resolves to zero weight")]
    ZeroWeight,

    /// The activation store failed; surfaced unchanged for telemetry.
    #[error(transparent)]
    Lookup(ActivationError),
}

/// Resolves `(miner, epoch)` to an activation id and voting weight.
#[derive(Clone)]
pub struct WeightResolver {
    db: Arc<dyn ActivationDb>,
}

impl WeightResolver {
    /// Creates a resolver over the given activation store.
    pub fn new(db: Arc<dyn ActivationDb>) -> Self {
        Self { db }
    }

    /// Returns the miner's activation id and voting weight for `epoch`.
    ///
    /// Every admitted voter must have weight > 0; a zero-weight activation
    /// is rejected here rather than silently contributing nothing.
    pub fn voting_weight(
        &self,
        node: &NodeId,
        epoch: EpochId,
    ) -> Result<(AtxId, u64), WeightError> {
        let prev_epoch = epoch.prev().ok_or(WeightError::AtxNotFound)?;

        let atx_id = self
            .db
            .node_atx_for_epoch(node, prev_epoch)
            .map_err(|e| match e {
                ActivationError::NotFound => WeightError::AtxNotFound,
                other => WeightError::Lookup(other),
            })?;

        let header = self.db.atx_header(&atx_id).map_err(WeightError::Lookup)?;
        let weight = header.weight();
        if weight == 0 {
            return Err(WeightError::ZeroWeight);
        }

        debug!(miner = %node, epoch = %epoch, atx = %atx_id, weight, "resolved voting weight");
        Ok((atx_id, weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    use petram_core::ActivationResult;
    use petram_types::ActivationHeader;

    /// Activation store stub with scripted responses.
    struct StubDb {
        atx: ActivationResult<AtxId>,
        header: ActivationResult<ActivationHeader>,
    }

    impl ActivationDb for StubDb {
        fn node_atx_for_epoch(&self, _: &NodeId, _: EpochId) -> ActivationResult<AtxId> {
            self.atx.clone()
        }
        fn atx_header(&self, _: &AtxId) -> ActivationResult<ActivationHeader> {
            self.header.clone()
        }
        fn atx_timestamp(&self, _: &AtxId) -> ActivationResult<SystemTime> {
            Ok(SystemTime::now())
        }
        fn epoch_total_weight(&self, _: EpochId) -> ActivationResult<u64> {
            Ok(0)
        }
    }

    fn node() -> NodeId {
        NodeId::new([1; 33], [2; 32])
    }

    #[test]
    fn resolves_weight_from_header() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Ok(AtxId::new([9; 32])),
            header: Ok(ActivationHeader {
                start_tick: 1,
                end_tick: 3,
                num_units: 5,
            }),
        }));

        let (atx, weight) = resolver.voting_weight(&node(), EpochId::new(10)).unwrap();
        assert_eq!(atx, AtxId::new([9; 32]));
        assert_eq!(weight, 10);
    }

    #[test]
    fn missing_activation_is_distinguished() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Err(ActivationError::NotFound),
            header: Ok(ActivationHeader::default()),
        }));

        assert_eq!(
            resolver.voting_weight(&node(), EpochId::new(10)),
            Err(WeightError::AtxNotFound)
        );
    }

    #[test]
    fn lookup_errors_pass_through() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Err(ActivationError::Lookup("disk on fire".into())),
            header: Ok(ActivationHeader::default()),
        }));

        assert_eq!(
            resolver.voting_weight(&node(), EpochId::new(10)),
            Err(WeightError::Lookup(ActivationError::Lookup(
                "disk on fire".into()
            )))
        );
    }

    #[test]
    fn header_errors_pass_through() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Ok(AtxId::new([9; 32])),
            header: Err(ActivationError::Lookup("corrupt".into())),
        }));

        assert!(matches!(
            resolver.voting_weight(&node(), EpochId::new(10)),
            Err(WeightError::Lookup(_))
        ));
    }

    #[test]
    fn zero_weight_is_rejected() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Ok(AtxId::new([9; 32])),
            header: Ok(ActivationHeader {
                start_tick: 5,
                end_tick: 5,
                num_units: 1,
            }),
        }));

        assert_eq!(
            resolver.voting_weight(&node(), EpochId::new(10)),
            Err(WeightError::ZeroWeight)
        );
    }

    #[test]
    fn epoch_zero_has_no_previous_activations() {
        let resolver = WeightResolver::new(Arc::new(StubDb {
            atx: Ok(AtxId::new([9; 32])),
            header: Ok(ActivationHeader::default()),
        }));

        assert_eq!(
            resolver.voting_weight(&node(), EpochId::new(0)),
            Err(WeightError::AtxNotFound)
        );
    }
}
