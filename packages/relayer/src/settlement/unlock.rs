//! Solana burn → L1 unlock

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use multichain_rs::{dest_to_origin, EvmAddress, OriginChain};

use crate::oracle::IdempotencyOracle;
use crate::retry::RpcEndpoint;
use crate::settlement::{SettlementOutcome, SettlementWorker};
use crate::types::{BridgeEvent, Direction, EvidenceKind, FailureReason, SettlementEvidence};

/// Unlocks burned amounts on the L1 bridge contract
///
/// The contract rejects a second unlock for the same burn signature; the
/// processed-flag check before submitting only saves a reverted transaction.
pub struct UnlockWorker {
    origin: Arc<dyn OriginChain>,
    rpc: RpcEndpoint,
    oracle: Arc<IdempotencyOracle>,
}

impl UnlockWorker {
    pub fn new(origin: Arc<dyn OriginChain>, rpc: RpcEndpoint, oracle: Arc<IdempotencyOracle>) -> Self {
        Self { origin, rpc, oracle }
    }

    fn contract_flag(event: &BridgeEvent, amount: u128) -> SettlementEvidence {
        SettlementEvidence {
            tx_id: None,
            amount,
            recipient: event.recipient.clone().unwrap_or_default(),
            kind: EvidenceKind::ContractFlag,
            block_time: None,
        }
    }
}

#[async_trait]
impl SettlementWorker for UnlockWorker {
    fn direction(&self) -> Direction {
        Direction::DestToL1
    }

    async fn settle(&self, event: &BridgeEvent) -> SettlementOutcome {
        let key = event.key();
        let recipient = match event.recipient.as_deref().map(EvmAddress::from_hex) {
            Some(Ok(addr)) if !addr.is_zero() => addr,
            Some(Ok(_)) => {
                return SettlementOutcome::Failed(FailureReason::RecipientInvalid(
                    "zero address".to_string(),
                ))
            }
            Some(Err(e)) => {
                return SettlementOutcome::Failed(FailureReason::RecipientInvalid(e.to_string()))
            }
            None => {
                return SettlementOutcome::Failed(FailureReason::RecipientInvalid(
                    "burn memo names no L1 recipient".to_string(),
                ))
            }
        };
        let amount = match u64::try_from(event.amount) {
            Ok(burned) => dest_to_origin(burned),
            Err(_) => {
                return SettlementOutcome::Failed(FailureReason::Permanent(format!(
                    "burn amount {} exceeds destination range",
                    event.amount
                )))
            }
        };

        match self.oracle.check_burn(event).await {
            Ok(Some(evidence)) => return SettlementOutcome::AlreadySettled(evidence),
            Ok(None) => {}
            Err(e) => return SettlementOutcome::deferred(format!("processed check failed: {}", e)),
        }

        info!(
            event = %key,
            recipient = %recipient,
            amount = %amount,
            "Submitting unlock"
        );

        match self
            .rpc
            .call("unlockTokens", || {
                self.origin.unlock(&recipient, amount, &event.source_tx_id)
            })
            .await
        {
            Ok(tx_hash) => {
                let evidence = SettlementEvidence {
                    tx_id: Some(tx_hash),
                    amount,
                    recipient: recipient.as_hex(),
                    kind: EvidenceKind::Submitted,
                    block_time: None,
                };
                self.oracle.record_settlement(key, evidence.clone()).await;
                SettlementOutcome::Settled(evidence)
            }
            Err(e) if e.source.is_already_processed() => {
                info!(event = %key, "Unlock reverted as already processed");
                SettlementOutcome::AlreadySettled(Self::contract_flag(event, amount))
            }
            Err(e) if e.is_permanent() => {
                match self
                    .rpc
                    .call("isSolanaTxProcessed", || {
                        self.origin.is_origin_tx_processed(&event.source_tx_id)
                    })
                    .await
                {
                    Ok(true) => SettlementOutcome::AlreadySettled(Self::contract_flag(event, amount)),
                    Ok(false) => SettlementOutcome::Failed(FailureReason::Permanent(e.to_string())),
                    Err(lookup) => {
                        warn!(event = %key, error = %lookup, "Processed re-check failed");
                        SettlementOutcome::deferred(format!("unlock rejected: {}", e))
                    }
                }
            }
            Err(e) => SettlementOutcome::deferred(format!("unlock submission failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleConfig;
    use crate::retry::RetryPolicy;
    use crate::types::EventSource;
    use multichain_rs::testing::{MockDestinationChain, MockOriginChain};
    use multichain_rs::{ChainError, DestinationChain as _};
    use std::time::Duration;

    const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

    struct Harness {
        dest: Arc<MockDestinationChain>,
        origin: Arc<MockOriginChain>,
        worker: UnlockWorker,
    }

    fn harness() -> Harness {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(100));
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let rpc = RpcEndpoint::new("l1", policy.clone(), 4);
        let oracle = Arc::new(IdempotencyOracle::new(
            dest.clone(),
            origin.clone(),
            RpcEndpoint::new("solana", policy, 4),
            rpc.clone(),
            OracleConfig::default(),
        ));
        let worker = UnlockWorker::new(origin.clone(), rpc, oracle);
        Harness { dest, origin, worker }
    }

    async fn burn(h: &Harness, amount: u64, memo: Option<&str>) -> BridgeEvent {
        let owner = MockDestinationChain::new_owner();
        let sig = h.dest.record_burn(&owner, amount, memo);
        let tx = h.dest.transaction(&sig).await.unwrap().unwrap();
        BridgeEvent::from_burn(&tx, EventSource::Watcher).unwrap()
    }

    #[tokio::test]
    async fn test_unlocks_scaled_amount_once() {
        let h = harness();
        let memo = format!("l1:{}", RECIPIENT);
        let event = burn(&h, 1_500_000_000, Some(&memo)).await;

        match h.worker.settle(&event).await {
            SettlementOutcome::Settled(evidence) => {
                assert_eq!(evidence.amount, 1_500_000_000_000_000_000);
                assert_eq!(evidence.recipient, RECIPIENT);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // a second run finds the contract flag
        assert!(matches!(
            h.worker.settle(&event).await,
            SettlementOutcome::AlreadySettled(_)
        ));
        assert_eq!(h.origin.unlock_count(), 1);
    }

    #[tokio::test]
    async fn test_already_processed_revert_is_success() {
        let h = harness();
        let event = burn(&h, 10, Some(RECIPIENT)).await;
        h.origin.fail_next_unlock(ChainError::Permanent(
            "execution reverted: Solana tx already processed".into(),
        ));

        let outcome = h.worker.settle(&event).await;
        match outcome {
            SettlementOutcome::AlreadySettled(evidence) => {
                assert_eq!(evidence.kind, EvidenceKind::ContractFlag)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_burn_without_recipient_fails() {
        let h = harness();
        let event = burn(&h, 10, None).await;
        assert!(matches!(
            h.worker.settle(&event).await,
            SettlementOutcome::Failed(FailureReason::RecipientInvalid(_))
        ));
        assert_eq!(h.origin.unlock_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_unlock_failure_defers() {
        let h = harness();
        let event = burn(&h, 10, Some(RECIPIENT)).await;
        for _ in 0..3 {
            h.origin
                .fail_next_unlock(ChainError::Transient("connection reset".into()));
        }

        assert!(matches!(
            h.worker.settle(&event).await,
            SettlementOutcome::Deferred { .. }
        ));
        assert_eq!(h.origin.unlock_count(), 0);
        assert!(matches!(h.worker.settle(&event).await, SettlementOutcome::Settled(_)));
    }

    #[tokio::test]
    async fn test_permanent_revert_fails_when_not_processed() {
        let h = harness();
        let event = burn(&h, 10, Some(RECIPIENT)).await;
        h.origin
            .fail_next_unlock(ChainError::Permanent("execution reverted: paused".into()));
        assert!(matches!(
            h.worker.settle(&event).await,
            SettlementOutcome::Failed(FailureReason::Permanent(_))
        ));
    }
}
