//! Decimal conversion between the L1 token (18 decimals) and the SPL mint (9 decimals)
//!
//! Origin-to-destination conversion truncates: the minted amount is never
//! larger than what was locked. Destination-to-origin conversion is exact.

use crate::error::ChainError;

/// Decimals of the L1 token
pub const L1_DECIMALS: u32 = 18;

/// Decimals of the destination SPL mint
pub const DEST_DECIMALS: u32 = 9;

const SCALE: u128 = 10u128.pow(L1_DECIMALS - DEST_DECIMALS);

/// Convert an L1 base-unit amount to destination base units, truncating
///
/// Fails when the truncated value does not fit the SPL `u64` amount field.
pub fn origin_to_dest(amount: u128) -> Result<u64, ChainError> {
    let truncated = amount / SCALE;
    u64::try_from(truncated).map_err(|_| {
        ChainError::Permanent(format!(
            "amount {} exceeds destination token range",
            amount
        ))
    })
}

/// Dust lost by truncation (origin base units)
pub fn truncation_remainder(amount: u128) -> u128 {
    amount % SCALE
}

/// Convert destination base units to L1 base units (exact)
pub fn dest_to_origin(amount: u64) -> u128 {
    amount as u128 * SCALE
}

/// Parse a decimal string ("500", "1.000000001") into base units
///
/// Digits beyond `decimals` are rejected rather than rounded.
#[cfg(test)]
fn parse_units(value: &str, decimals: u32) -> Result<u128, ChainError> {
    let value = value.trim();
    let invalid = || ChainError::Permanent(format!("invalid decimal amount: {:?}", value));

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(invalid());
    }

    let scale = 10u128.pow(decimals);
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac_padded = format!("{:0<width$}", frac, width = decimals as usize);
    let frac: u128 = if decimals == 0 {
        0
    } else {
        frac_padded.parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

/// Render base units as a decimal string without trailing zeros
pub fn format_units(amount: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_nano_survives_conversion() {
        let locked = parse_units("1.000000001", L1_DECIMALS).unwrap();
        assert_eq!(locked, 1_000_000_001_000_000_000);
        let minted = origin_to_dest(locked).unwrap();
        assert_eq!(minted, 1_000_000_001);
        assert_eq!(format_units(minted as u128, DEST_DECIMALS), "1.000000001");
        assert_eq!(dest_to_origin(minted), locked);
    }

    #[test]
    fn test_truncates_never_rounds_up() {
        let locked = parse_units("1.000000001999999999", L1_DECIMALS).unwrap();
        let minted = origin_to_dest(locked).unwrap();
        assert_eq!(minted, 1_000_000_001);
        assert!(dest_to_origin(minted) <= locked);
        assert_eq!(truncation_remainder(locked), 999_999_999);
    }

    #[test]
    fn test_sub_precision_amount_truncates_to_zero() {
        assert_eq!(origin_to_dest(999_999_999).unwrap(), 0);
    }

    #[test]
    fn test_five_hundred_tokens() {
        let locked = parse_units("500", L1_DECIMALS).unwrap();
        assert_eq!(origin_to_dest(locked).unwrap(), 500_000_000_000);
    }

    #[test]
    fn test_overflow_is_permanent() {
        let err = origin_to_dest(u128::MAX).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_units_rejects_excess_precision() {
        assert!(parse_units("1.0000000001", DEST_DECIMALS).is_err());
        assert!(parse_units("abc", DEST_DECIMALS).is_err());
        assert!(parse_units(".", DEST_DECIMALS).is_err());
        assert_eq!(parse_units(".5", DEST_DECIMALS).unwrap(), 500_000_000);
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(0, DEST_DECIMALS), "0");
        assert_eq!(format_units(1_500_000_000, DEST_DECIMALS), "1.5");
        assert_eq!(format_units(1, L1_DECIMALS), "0.000000000000000001");
    }
}
