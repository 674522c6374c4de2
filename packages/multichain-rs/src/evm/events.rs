//! EVM Event Parsing

use alloy::rpc::types::Log;
use tracing::warn;

use super::contracts::MarsBridge;
use crate::types::{EvmAddress, LockEvent};

/// Decode a `TokensLocked` log
///
/// Returns `None` for logs that are not lock events or are missing block
/// metadata (pending logs).
pub fn parse_lock_log(log: &Log) -> Option<LockEvent> {
    let decoded = match log.log_decode::<MarsBridge::TokensLocked>() {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Failed to decode TokensLocked log");
            return None;
        }
    };
    let event = decoded.inner.data;

    let block_number = log.block_number?;
    let tx_hash = log.transaction_hash?;

    let bridge_id: u64 = match event.bridgeId.try_into() {
        Ok(id) => id,
        Err(_) => {
            warn!(bridge_id = %event.bridgeId, "Bridge id exceeds u64, skipping log");
            return None;
        }
    };
    let amount: u128 = match event.amount.try_into() {
        Ok(amount) => amount,
        Err(_) => {
            warn!(bridge_id, amount = %event.amount, "Lock amount exceeds u128, skipping log");
            return None;
        }
    };

    Some(LockEvent {
        bridge_id,
        user: EvmAddress(event.user.0 .0),
        amount,
        recipient: event.solanaRecipient.trim().to_string(),
        tx_hash: format!("0x{:x}", tx_hash),
        block_number,
        log_index: log.log_index.unwrap_or_default(),
    })
}
