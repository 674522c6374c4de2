//! On-chain memo formats used by the bridge
//!
//! Mints carry `bridgeId:<n>` so the idempotency check can match them exactly.
//! Older mints carry `Bridge ID: <n>`; both are recognised when scanning.
//! Burns carry the L1 recipient as `l1:0x<40 hex>` (a bare `0x<40 hex>` token
//! is accepted too).

use crate::types::EvmAddress;

const MEMO_PREFIX: &str = "bridgeId:";
const LEGACY_MEMO_PREFIX: &str = "Bridge ID:";
const RECIPIENT_PREFIX: &str = "l1:";

/// Memo written into every mint transaction
pub fn bridge_memo(bridge_id: u64) -> String {
    format!("{}{}", MEMO_PREFIX, bridge_id)
}

/// Extract the bridge id from a memo written by this or the previous relayer
///
/// RPC log output sometimes wraps memo data as `[len] text`; the prefix is
/// searched anywhere in the string.
pub fn parse_bridge_id(memo: &str) -> Option<u64> {
    [MEMO_PREFIX, LEGACY_MEMO_PREFIX].iter().find_map(|prefix| {
        let start = memo.find(prefix)? + prefix.len();
        let digits: String = memo[start..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    })
}

/// Memo a user attaches to a burn to name the L1 recipient
pub fn burn_memo(recipient: &EvmAddress) -> String {
    format!("{}{}", RECIPIENT_PREFIX, recipient.as_hex())
}

/// Find the L1 recipient in a burn memo
pub fn parse_l1_recipient(memo: &str) -> Option<EvmAddress> {
    memo.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|token| token.strip_prefix(RECIPIENT_PREFIX).unwrap_or(token))
        .filter(|token| token.len() == 42 && token.starts_with("0x"))
        .find_map(|token| EvmAddress::from_hex(token).ok())
}
