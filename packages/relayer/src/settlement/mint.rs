//! L1 lock → Solana mint

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use multichain_rs::amount::{format_units, truncation_remainder};
use multichain_rs::{
    bridge_memo, origin_to_dest, DestTransaction, DestinationChain, DEST_DECIMALS,
};

use crate::oracle::IdempotencyOracle;
use crate::registry::EventRegistry;
use crate::retry::RpcEndpoint;
use crate::settlement::{SettlementOutcome, SettlementWorker};
use crate::types::{
    BridgeEvent, Direction, EvidenceKind, FailureReason, PendingSubmission, SettlementEvidence,
};

/// Mints the bridged amount to the recipient's associated token account
///
/// Every mint carries the `bridgeId:<n>` memo. The signed transaction is
/// recorded as pending before it is sent, and the next attempt looks for it
/// on chain before building a new one.
pub struct MintWorker {
    dest: Arc<dyn DestinationChain>,
    rpc: RpcEndpoint,
    oracle: Arc<IdempotencyOracle>,
    registry: Arc<EventRegistry>,
    resubmit_grace: Duration,
}

impl MintWorker {
    pub fn new(
        dest: Arc<dyn DestinationChain>,
        rpc: RpcEndpoint,
        oracle: Arc<IdempotencyOracle>,
        registry: Arc<EventRegistry>,
        resubmit_grace: Duration,
    ) -> Self {
        Self {
            dest,
            rpc,
            oracle,
            registry,
            resubmit_grace,
        }
    }

    /// Resolve a submission left by an earlier attempt
    ///
    /// `Some` ends this attempt. `None` means the pending transaction can no
    /// longer land and a fresh one may be built.
    async fn reconcile_pending(
        &self,
        event: &BridgeEvent,
        pending: &PendingSubmission,
    ) -> Option<SettlementOutcome> {
        let key = event.key();
        let landed = match self
            .rpc
            .call("getTransaction", || self.dest.transaction(&pending.signature))
            .await
        {
            Ok(landed) => landed,
            Err(e) => {
                return Some(SettlementOutcome::Deferred {
                    reason: format!("pending mint lookup failed: {}", e),
                    pending_tx: Some(pending.clone()),
                })
            }
        };

        match landed {
            Some(tx) if !tx.failed => {
                info!(event = %key, signature = %tx.signature, "Pending mint landed");
                let evidence = submitted_evidence(&tx);
                self.oracle.record_settlement(key, evidence.clone()).await;
                Some(SettlementOutcome::Settled(evidence))
            }
            Some(_) => {
                warn!(event = %key, signature = %pending.signature, "Pending mint failed on chain");
                None
            }
            None => {
                let age = (Utc::now() - pending.submitted_at)
                    .to_std()
                    .unwrap_or_default();
                if age < self.resubmit_grace {
                    return Some(SettlementOutcome::Deferred {
                        reason: "pending mint not yet visible".to_string(),
                        pending_tx: Some(pending.clone()),
                    });
                }
                // signed transactions expire with their blockhash
                warn!(
                    event = %key,
                    signature = %pending.signature,
                    age_secs = age.as_secs(),
                    "Pending mint never landed, rebuilding"
                );
                None
            }
        }
    }

    async fn ensure_token_account(&self, owner: &str, token_account: &str) -> Result<(), String> {
        let exists = self
            .rpc
            .call("getAccountInfo", || self.dest.account_exists(token_account))
            .await
            .map_err(|e| e.to_string())?;
        if exists {
            return Ok(());
        }

        let create = self
            .rpc
            .call("prepareCreateAccount", || self.dest.prepare_create_account(owner))
            .await
            .map_err(|e| e.to_string())?;
        let signature = self
            .rpc
            .call("sendTransaction", || self.dest.submit(&create))
            .await
            .map_err(|e| e.to_string())?;
        info!(owner = %owner, token_account = %token_account, signature = %signature, "Created recipient token account");
        Ok(())
    }
}

#[async_trait]
impl SettlementWorker for MintWorker {
    fn direction(&self) -> Direction {
        Direction::L1ToDest
    }

    async fn settle(&self, event: &BridgeEvent) -> SettlementOutcome {
        let key = event.key();
        let Some(bridge_id) = event.bridge_id else {
            return SettlementOutcome::Failed(FailureReason::Permanent(
                "lock without bridge id".to_string(),
            ));
        };
        let owner = match event.recipient.as_deref().map(str::trim) {
            Some(owner) if !owner.is_empty() => owner,
            _ => {
                return SettlementOutcome::Failed(FailureReason::RecipientInvalid(
                    "empty recipient".to_string(),
                ))
            }
        };
        let token_account = match self.dest.associated_token_account(owner) {
            Ok(account) => account,
            Err(e) => {
                return SettlementOutcome::Failed(FailureReason::RecipientInvalid(
                    e.message().to_string(),
                ))
            }
        };

        if let Some(pending) = &event.pending_tx {
            if let Some(outcome) = self.reconcile_pending(event, pending).await {
                return outcome;
            }
        }

        match self.oracle.check_lock(event).await {
            Ok(Some(evidence)) => return SettlementOutcome::AlreadySettled(evidence),
            Ok(None) => {}
            Err(e) => return SettlementOutcome::deferred(format!("settlement check failed: {}", e)),
        }

        let amount = match origin_to_dest(event.amount) {
            Ok(0) => return SettlementOutcome::Failed(FailureReason::AmountBelowPrecision),
            Ok(amount) => amount,
            Err(e) => return SettlementOutcome::Failed(FailureReason::Permanent(e.message().to_string())),
        };
        let dust = truncation_remainder(event.amount);
        if dust > 0 {
            debug!(event = %key, dust = %dust, "Truncated sub-precision remainder");
        }

        if let Err(e) = self.ensure_token_account(owner, &token_account).await {
            return SettlementOutcome::deferred(format!("token account setup failed: {}", e));
        }

        let memo = bridge_memo(bridge_id);
        let prepared = match self
            .rpc
            .call("prepareMint", || self.dest.prepare_mint(owner, amount, &memo))
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => return SettlementOutcome::deferred(format!("mint preparation failed: {}", e)),
        };

        let pending = PendingSubmission {
            signature: prepared.signature.clone(),
            submitted_at: Utc::now(),
        };
        self.registry
            .update(&key, |e| e.pending_tx = Some(pending.clone()))
            .await;

        info!(
            event = %key,
            recipient = %owner,
            token_account = %token_account,
            amount,
            tokens = %format_units(amount as u128, DEST_DECIMALS),
            memo = %memo,
            signature = %prepared.signature,
            "Submitting mint"
        );

        match self
            .rpc
            .call("sendTransaction", || self.dest.submit(&prepared))
            .await
        {
            Ok(signature) => {
                let evidence = SettlementEvidence {
                    tx_id: Some(signature),
                    amount: amount as u128,
                    recipient: token_account,
                    kind: EvidenceKind::Submitted,
                    block_time: None,
                };
                self.oracle.record_settlement(key, evidence.clone()).await;
                SettlementOutcome::Settled(evidence)
            }
            Err(e) if e.is_permanent() => {
                // a rejected transaction may still have landed under a previous send
                match self
                    .rpc
                    .call("getTransaction", || self.dest.transaction(&prepared.signature))
                    .await
                {
                    Ok(Some(tx)) if !tx.failed => {
                        let evidence = submitted_evidence(&tx);
                        self.oracle.record_settlement(key, evidence.clone()).await;
                        SettlementOutcome::Settled(evidence)
                    }
                    Ok(_) => SettlementOutcome::Failed(FailureReason::Permanent(e.to_string())),
                    Err(lookup) => SettlementOutcome::Deferred {
                        reason: format!("mint rejected ({}), lookup failed: {}", e, lookup),
                        pending_tx: Some(pending),
                    },
                }
            }
            Err(e) => SettlementOutcome::Deferred {
                reason: format!("mint submission failed: {}", e),
                pending_tx: Some(pending),
            },
        }
    }
}

fn submitted_evidence(tx: &DestTransaction) -> SettlementEvidence {
    let (recipient, amount) = tx
        .mints
        .first()
        .map(|m| (m.token_account.clone(), m.amount as u128))
        .unwrap_or_default();
    SettlementEvidence {
        tx_id: Some(tx.signature.clone()),
        amount,
        recipient,
        kind: EvidenceKind::Submitted,
        block_time: tx.block_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleConfig;
    use crate::retry::RetryPolicy;
    use crate::types::EventSource;
    use multichain_rs::testing::{MockDestinationChain, MockOriginChain};
    use multichain_rs::ChainError;

    const UNIT: u128 = 1_000_000_000;

    struct Harness {
        dest: Arc<MockDestinationChain>,
        origin: Arc<MockOriginChain>,
        registry: Arc<EventRegistry>,
        worker: MintWorker,
    }

    fn harness(grace: Duration) -> Harness {
        let dest = Arc::new(MockDestinationChain::new());
        let origin = Arc::new(MockOriginChain::new(2000));
        let registry = Arc::new(EventRegistry::new());
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let rpc = RpcEndpoint::new("solana", policy.clone(), 4);
        let oracle = Arc::new(IdempotencyOracle::new(
            dest.clone(),
            origin.clone(),
            rpc.clone(),
            RpcEndpoint::new("l1", policy, 4),
            OracleConfig::default(),
        ));
        let worker = MintWorker::new(dest.clone(), rpc, oracle, registry.clone(), grace);
        Harness {
            dest,
            origin,
            registry,
            worker,
        }
    }

    async fn lock(h: &Harness, bridge_id: u64, owner: &str, amount: u128) -> BridgeEvent {
        let lock = h.origin.push_lock(bridge_id, owner, amount, 1000);
        let event = BridgeEvent::from_lock(&lock, EventSource::Watcher);
        h.registry.ingest(event.clone()).await;
        event
    }

    #[tokio::test]
    async fn test_mints_with_memo_and_creates_account() {
        let h = harness(Duration::from_secs(120));
        let owner = MockDestinationChain::new_owner();
        let event = lock(&h, 42, &owner, 500 * UNIT).await;

        let outcome = h.worker.settle(&event).await;
        assert!(matches!(outcome, SettlementOutcome::Settled(_)));

        let mints = h.dest.mints_to(&owner);
        assert_eq!(mints.len(), 1);
        assert_eq!(mints[0].mints[0].amount, 500);
        assert_eq!(mints[0].memos, vec!["bridgeId:42".to_string()]);
        assert!(h.registry.get(&event.key()).await.unwrap().pending_tx.is_some());
    }

    #[tokio::test]
    async fn test_already_minted_lock_is_not_minted_again() {
        let h = harness(Duration::from_secs(120));
        let owner = MockDestinationChain::new_owner();
        h.dest.record_mint(&owner, 500, Some("bridgeId:42"), Utc::now().timestamp());
        let event = lock(&h, 42, &owner, 500 * UNIT).await;

        let outcome = h.worker.settle(&event).await;
        match outcome {
            SettlementOutcome::AlreadySettled(evidence) => {
                assert_eq!(evidence.kind, EvidenceKind::MemoTagged)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.dest.mint_count(), 1);
        assert_eq!(h.dest.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_recipient_and_dust_fail() {
        let h = harness(Duration::from_secs(120));
        let bad = lock(&h, 1, "not-a-pubkey", 500 * UNIT).await;
        assert!(matches!(
            h.worker.settle(&bad).await,
            SettlementOutcome::Failed(FailureReason::RecipientInvalid(_))
        ));

        let dust = lock(&h, 2, &MockDestinationChain::new_owner(), UNIT - 1).await;
        assert_eq!(
            h.worker.settle(&dust).await,
            SettlementOutcome::Failed(FailureReason::AmountBelowPrecision)
        );
        assert_eq!(h.dest.mint_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_send_that_landed_is_settled() {
        let h = harness(Duration::from_secs(120));
        let owner = MockDestinationChain::new_owner();
        let event = lock(&h, 7, &owner, 3 * UNIT).await;
        let create = h.dest.prepare_create_account(&owner).await.unwrap();
        h.dest.submit(&create).await.unwrap();

        h.dest
            .land_then_fail_next_submit(ChainError::Permanent("invalid response".into()));
        assert!(matches!(h.worker.settle(&event).await, SettlementOutcome::Settled(_)));
        assert_eq!(h.dest.mint_count(), 1);
    }

    #[tokio::test]
    async fn test_landed_pending_mint_settles_without_resubmit() {
        let h = harness(Duration::from_secs(120));
        let owner = MockDestinationChain::new_owner();
        let mut event = lock(&h, 8, &owner, 2 * UNIT).await;
        let create = h.dest.prepare_create_account(&owner).await.unwrap();
        h.dest.submit(&create).await.unwrap();

        // a previous process signed and sent this mint before crashing
        let earlier = h.dest.prepare_mint(&owner, 2, "bridgeId:8").await.unwrap();
        h.dest.submit(&earlier).await.unwrap();
        let submits = h.dest.submit_calls();
        event.pending_tx = Some(PendingSubmission {
            signature: earlier.signature.clone(),
            submitted_at: Utc::now(),
        });

        match h.worker.settle(&event).await {
            SettlementOutcome::Settled(evidence) => {
                assert_eq!(evidence.tx_id.as_deref(), Some(earlier.signature.as_str()))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.dest.submit_calls(), submits);
        assert_eq!(h.dest.mint_count(), 1);
    }

    #[tokio::test]
    async fn test_unseen_pending_mint_defers_within_grace() {
        let h = harness(Duration::from_secs(120));
        let owner = MockDestinationChain::new_owner();
        let mut event = lock(&h, 9, &owner, UNIT).await;
        event.pending_tx = Some(PendingSubmission {
            signature: "never-sent".into(),
            submitted_at: Utc::now(),
        });

        assert!(matches!(
            h.worker.settle(&event).await,
            SettlementOutcome::Deferred { .. }
        ));
        assert_eq!(h.dest.mint_count(), 0);

        // past the grace period the worker rebuilds and mints once
        event.pending_tx = Some(PendingSubmission {
            signature: "never-sent".into(),
            submitted_at: Utc::now() - chrono::Duration::seconds(600),
        });
        assert!(matches!(h.worker.settle(&event).await, SettlementOutcome::Settled(_)));
        assert_eq!(h.dest.mint_count(), 1);
    }
}
