//! Bridge event records and settlement evidence

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use multichain_rs::{DestTransaction, LockEvent};

/// Which way value moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// L1 lock, Solana mint
    L1ToDest,
    /// Solana burn, L1 unlock
    DestToL1,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::L1ToDest => "l1_to_dest",
            Direction::DestToL1 => "dest_to_l1",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline status of a bridge event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Detected,
    Confirming,
    Confirmed,
    Settling,
    Settled,
    Failed,
}

impl BridgeStatus {
    pub const ALL: [BridgeStatus; 6] = [
        BridgeStatus::Detected,
        BridgeStatus::Confirming,
        BridgeStatus::Confirmed,
        BridgeStatus::Settling,
        BridgeStatus::Settled,
        BridgeStatus::Failed,
    ];

    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Detected => "detected",
            BridgeStatus::Confirming => "confirming",
            BridgeStatus::Confirmed => "confirmed",
            BridgeStatus::Settling => "settling",
            BridgeStatus::Settled => "settled",
            BridgeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgeStatus::Settled | BridgeStatus::Failed)
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BridgeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BridgeStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown status: {}", s))
    }
}

/// Identity of a bridge event: one settlement per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKey {
    Lock { bridge_id: u64 },
    Burn { signature: String },
}

impl EventKey {
    pub fn direction(&self) -> Direction {
        match self {
            EventKey::Lock { .. } => Direction::L1ToDest,
            EventKey::Burn { .. } => Direction::DestToL1,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Lock { bridge_id } => write!(f, "lock:{}", bridge_id),
            EventKey::Burn { signature } => write!(f, "burn:{}", signature),
        }
    }
}

/// Where an event was first observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Watcher,
    Backfill,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Watcher => "watcher",
            EventSource::Backfill => "backfill",
        }
    }
}

/// How settlement was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Mint carrying this event's bridge id memo
    MemoTagged,
    /// Memo-less mint matched on recipient, amount and time window
    LegacyAmountMatch,
    /// L1 contract reports the burn as processed
    ContractFlag,
    /// Settled by this process
    Submitted,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::MemoTagged => "memo_tagged",
            EvidenceKind::LegacyAmountMatch => "legacy_amount_match",
            EvidenceKind::ContractFlag => "contract_flag",
            EvidenceKind::Submitted => "submitted",
        }
    }
}

/// Proof that an event was settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvidence {
    /// Mint signature or unlock hash; absent when only the contract flag is known
    pub tx_id: Option<String>,
    /// Amount recorded on the settling chain, in that chain's base units
    pub amount: u128,
    /// Token account (mint) or L1 address (unlock) credited
    pub recipient: String,
    pub kind: EvidenceKind,
    /// Block time of the settling transaction, when known
    pub block_time: Option<i64>,
}

/// Why an event was given up on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    RecipientInvalid(String),
    ConfirmationTimeout(u64),
    AmountBelowPrecision,
    Permanent(String),
}

impl FailureReason {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::RecipientInvalid(_) => "recipient_invalid",
            FailureReason::ConfirmationTimeout(_) => "confirmation_timeout",
            FailureReason::AmountBelowPrecision => "amount_below_precision",
            FailureReason::Permanent(_) => "permanent",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RecipientInvalid(detail) => write!(f, "invalid recipient: {}", detail),
            FailureReason::ConfirmationTimeout(secs) => {
                write!(f, "not confirmed within {}s", secs)
            }
            FailureReason::AmountBelowPrecision => {
                write!(f, "amount truncates to zero at destination precision")
            }
            FailureReason::Permanent(detail) => write!(f, "permanent error: {}", detail),
        }
    }
}

/// A signed destination transaction that may or may not have landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub signature: String,
    pub submitted_at: DateTime<Utc>,
}

/// A detected lock or burn, and everything known about its settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub direction: Direction,
    /// L1 tx hash (locks) or Solana signature (burns)
    pub source_tx_id: String,
    /// Set for locks only
    pub bridge_id: Option<u64>,
    /// Origin-chain base units: 18 decimals for locks, 9 for burns
    pub amount: u128,
    /// Solana owner (locks) or L1 address (burns); `None` when the burn named none
    pub recipient: Option<String>,
    /// L1 block or Solana slot of the source transaction
    pub origin_height: u64,
    pub status: BridgeStatus,
    pub source: EventSource,
    pub confirmations: u64,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Settlement attempts that ended deferred
    pub attempts: u32,
    pub retry_after: Option<DateTime<Utc>>,
    pub pending_tx: Option<PendingSubmission>,
    pub evidence: Option<SettlementEvidence>,
    pub failure: Option<FailureReason>,
}

impl BridgeEvent {
    fn new(
        direction: Direction,
        source_tx_id: String,
        bridge_id: Option<u64>,
        amount: u128,
        recipient: Option<String>,
        origin_height: u64,
        source: EventSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            direction,
            source_tx_id,
            bridge_id,
            amount,
            recipient,
            origin_height,
            status: BridgeStatus::Detected,
            source,
            confirmations: 0,
            detected_at: now,
            updated_at: now,
            attempts: 0,
            retry_after: None,
            pending_tx: None,
            evidence: None,
            failure: None,
        }
    }

    pub fn from_lock(lock: &LockEvent, source: EventSource) -> Self {
        Self::new(
            Direction::L1ToDest,
            lock.tx_hash.clone(),
            Some(lock.bridge_id),
            lock.amount,
            Some(lock.recipient.clone()),
            lock.block_number,
            source,
        )
    }

    /// Build a burn event; `None` for failed transactions or ones without a bridge burn
    ///
    /// Several burns in one transaction are summed into one event.
    pub fn from_burn(tx: &DestTransaction, source: EventSource) -> Option<Self> {
        if tx.failed || tx.burns.is_empty() {
            return None;
        }
        let amount = tx.burned_amount();
        if amount == 0 {
            return None;
        }
        Some(Self::new(
            Direction::DestToL1,
            tx.signature.clone(),
            None,
            amount as u128,
            tx.l1_recipient().map(|addr| addr.as_hex()),
            tx.slot,
            source,
        ))
    }

    pub fn key(&self) -> EventKey {
        match (self.direction, self.bridge_id) {
            (Direction::L1ToDest, Some(bridge_id)) => EventKey::Lock { bridge_id },
            _ => EventKey::Burn {
                signature: self.source_tx_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multichain_rs::{BurnRecord, EvmAddress};

    fn burn_tx(memos: Vec<String>, amounts: &[u64], failed: bool) -> DestTransaction {
        DestTransaction {
            signature: "burnsig".into(),
            slot: 99,
            block_time: None,
            failed,
            memos,
            mints: vec![],
            burns: amounts
                .iter()
                .map(|a| BurnRecord {
                    token_account: "acct".into(),
                    owner: "owner".into(),
                    amount: *a,
                })
                .collect(),
        }
    }

    #[test]
    fn test_status_as_str_roundtrip() {
        for status in BridgeStatus::ALL {
            assert_eq!(status.as_str().parse::<BridgeStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<BridgeStatus>().is_err());
        assert!(BridgeStatus::Settled.is_terminal());
        assert!(!BridgeStatus::Settling.is_terminal());
    }

    #[test]
    fn test_lock_event_key() {
        let lock = LockEvent {
            bridge_id: 42,
            user: EvmAddress([1; 20]),
            amount: 500,
            recipient: "dest".into(),
            tx_hash: "0xabc".into(),
            block_number: 1000,
            log_index: 0,
        };
        let event = BridgeEvent::from_lock(&lock, EventSource::Watcher);
        assert_eq!(event.key(), EventKey::Lock { bridge_id: 42 });
        assert_eq!(event.key().to_string(), "lock:42");
        assert_eq!(event.status, BridgeStatus::Detected);
        assert_eq!(event.origin_height, 1000);
    }

    #[test]
    fn test_burn_event_sums_amounts_and_reads_recipient() {
        let addr = EvmAddress([0xaa; 20]);
        let tx = burn_tx(vec![multichain_rs::memo::burn_memo(&addr)], &[2, 3], false);
        let event = BridgeEvent::from_burn(&tx, EventSource::Backfill).unwrap();
        assert_eq!(event.amount, 5);
        assert_eq!(event.recipient, Some(addr.as_hex()));
        assert_eq!(
            event.key(),
            EventKey::Burn {
                signature: "burnsig".into()
            }
        );
        assert_eq!(event.key().direction(), Direction::DestToL1);
    }

    #[test]
    fn test_burn_without_memo_has_no_recipient() {
        let event = BridgeEvent::from_burn(&burn_tx(vec![], &[7], false), EventSource::Watcher)
            .unwrap();
        assert_eq!(event.recipient, None);
    }

    #[test]
    fn test_failed_or_empty_burns_are_skipped() {
        assert!(BridgeEvent::from_burn(&burn_tx(vec![], &[7], true), EventSource::Watcher).is_none());
        assert!(BridgeEvent::from_burn(&burn_tx(vec![], &[], false), EventSource::Watcher).is_none());
    }

    #[test]
    fn test_failure_labels() {
        assert_eq!(FailureReason::ConfirmationTimeout(1200).label(), "confirmation_timeout");
        assert!(FailureReason::RecipientInvalid("x".into())
            .to_string()
            .contains("invalid recipient"));
    }
}
