//! Common Test Assertions

use eyre::{eyre, Result};

use super::{MockDestinationChain, MockOriginChain};

/// Assert that `owner` received exactly one mint, tagged with `bridge_id`
pub fn assert_single_mint(chain: &MockDestinationChain, owner: &str, bridge_id: u64) -> Result<u64> {
    let mints = chain.mints_to(owner);
    let tagged: Vec<_> = mints
        .iter()
        .filter(|tx| tx.bridge_id() == Some(bridge_id))
        .collect();

    match tagged.as_slice() {
        [tx] => Ok(tx.mints.iter().map(|m| m.amount).sum()),
        [] => Err(eyre!("no mint tagged bridgeId:{} for {}", bridge_id, owner)),
        many => Err(eyre!(
            "{} mints tagged bridgeId:{} for {}",
            many.len(),
            bridge_id,
            owner
        )),
    }
}

/// Assert that the burn was unlocked exactly once
pub fn assert_single_unlock(chain: &MockOriginChain, burn_signature: &str) -> Result<u128> {
    let unlocks: Vec<_> = chain
        .unlocks()
        .into_iter()
        .filter(|u| u.burn_signature == burn_signature)
        .collect();

    match unlocks.as_slice() {
        [unlock] => Ok(unlock.amount),
        other => Err(eyre!(
            "expected one unlock for {}, found {}",
            burn_signature,
            other.len()
        )),
    }
}

/// Assert that an amount is within a tolerance of expected
pub fn assert_amount_approx_eq(actual: u128, expected: u128, tolerance: u128) -> Result<()> {
    let diff = actual.abs_diff(expected);
    if diff > tolerance {
        return Err(eyre!(
            "Amount mismatch: expected {} (+/- {}), got {}",
            expected,
            tolerance,
            actual
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_amount_approx_eq() {
        assert!(assert_amount_approx_eq(100, 101, 1).is_ok());
        assert!(assert_amount_approx_eq(100, 103, 1).is_err());
    }
}
