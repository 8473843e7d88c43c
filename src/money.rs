//! Money Conversion Module
//!
//! Conversion between human decimal amounts ("0.1" ETH) and the integer
//! smallest-unit representation used on chain (wei, 10^-6 USDC).
//!
//! ## Rules
//! 1. Amounts are never floating point: strings or `rust_decimal::Decimal` only
//! 2. No silent truncation: extra fractional digits are rejected
//! 3. Smallest units are `u128` (18-decimal tokens overflow `u64` quickly)
//!
//! ## Usage
//! ```rust
//! use cirx_settlement::money::{format_amount, parse_amount};
//!
//! let wei = parse_amount("0.1", 18).unwrap();
//! assert_eq!(wei, 100_000_000_000_000_000);
//! assert_eq!(format_amount(wei, 18).unwrap(), "0.100000000000000000");
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

/// Largest scale `rust_decimal` can represent.
const MAX_DECIMALS: u32 = 28;

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: decimal string → smallest unit
// ============================================================================

/// Convert a decimal amount string to smallest units.
///
/// # Errors
/// * `PrecisionOverflow` - more fractional digits than `decimals`
/// * `InvalidAmount` - zero or signed input
/// * `Overflow` - result does not fit `u128`
/// * `InvalidFormat` - anything that is not `digits[.digits]`
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<u128, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }

    if frac.len() > decimals as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: decimals,
        });
    }

    let whole_num: u128 = whole.parse().map_err(|_| MoneyError::Overflow)?;

    let frac_num: u128 = if frac.is_empty() {
        0
    } else {
        let frac_padded = format!("{:0<width$}", frac, width = decimals as usize);
        frac_padded
            .parse()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    let multiplier = 10u128
        .checked_pow(decimals)
        .ok_or(MoneyError::Overflow)?;
    let amount = whole_num
        .checked_mul(multiplier)
        .and_then(|v| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)?;

    if amount == 0 {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(amount)
}

/// Convert an already-parsed `Decimal` to smallest units.
pub fn parse_decimal(decimal: Decimal, decimals: u32) -> Result<u128, MoneyError> {
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = decimal.normalize();
    if normalized.scale() > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: decimals,
        });
    }

    parse_amount(&normalized.to_string(), decimals)
}

// ============================================================================
// Format: smallest unit → decimal
// ============================================================================

/// Convert smallest units back to a `Decimal` carrying exactly `decimals` scale.
pub fn to_decimal(value: u128, decimals: u32) -> Result<Decimal, MoneyError> {
    if decimals > MAX_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: decimals,
            max: MAX_DECIMALS,
        });
    }
    let signed = i128::try_from(value).map_err(|_| MoneyError::Overflow)?;
    Decimal::try_from_i128_with_scale(signed, decimals).map_err(|_| MoneyError::Overflow)
}

/// Full-precision string for smallest units (`100000000000000000`, 18 → `"0.100000000000000000"`).
pub fn format_amount(value: u128, decimals: u32) -> Result<String, MoneyError> {
    Ok(to_decimal(value, decimals)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn qa_eth_tenth_roundtrip() {
        let wei = parse_amount("0.1", 18).unwrap();
        assert_eq!(wei.to_string(), "100000000000000000");
        assert_eq!(format_amount(wei, 18).unwrap(), "0.100000000000000000");
    }

    #[test]
    fn qa_usdc_roundtrip_is_lossless() {
        for input in ["1000", "0.000001", "123456.789012"] {
            let units = parse_amount(input, 6).unwrap();
            let back = to_decimal(units, 6).unwrap();
            assert_eq!(back, Decimal::from_str(input).unwrap(), "input {}", input);
        }
    }

    #[test]
    fn qa_parse_amount_invalid_formats() {
        assert!(matches!(parse_amount("", 6), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_amount(".5", 6), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_amount("5.", 6), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_amount("1.2.3", 6), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_amount("1e5", 6), Err(MoneyError::InvalidFormat(_))));
        assert_eq!(parse_amount("-1", 6), Err(MoneyError::InvalidAmount));
        assert_eq!(parse_amount("0.0", 6), Err(MoneyError::InvalidAmount));
    }

    #[test]
    fn qa_parse_amount_precision_limits() {
        assert_eq!(
            parse_amount("0.0000001", 6),
            Err(MoneyError::PrecisionOverflow {
                provided: 7,
                max: 6
            })
        );
        assert_eq!(parse_amount("0.000000000000000001", 18).unwrap(), 1);
    }

    #[test]
    fn qa_parse_decimal_normalizes_trailing_zeros() {
        let d = Decimal::from_str("1.500000").unwrap();
        assert_eq!(parse_decimal(d, 1).unwrap(), 15);
        assert_eq!(parse_decimal(Decimal::ZERO, 6), Err(MoneyError::InvalidAmount));
    }

    #[test]
    fn qa_to_decimal_overflow() {
        assert_eq!(to_decimal(u128::MAX, 18), Err(MoneyError::Overflow));
    }
}
