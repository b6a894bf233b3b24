//! Monetary units of the ledger
//!
//! Values are carried as `u64` minor units so hashing and arithmetic stay
//! exact. One coin is 100,000,000 units.
use crate::error::{BlockchainError, Result};

/// Number of minor units in one coin
pub const UNITS_PER_COIN: u64 = 100_000_000;

const DECIMALS: usize = 8;

/// Reward paid by every coinbase transaction (50 coins)
pub const BLOCK_REWARD: u64 = 50 * UNITS_PER_COIN;

/// Parse a decimal coin amount such as `"30"` or `"0.5"` into minor units.
///
/// # Examples
/// ```
/// use ledger_chain::core::monetary::parse_amount;
/// assert_eq!(parse_amount("30").unwrap(), 3_000_000_000);
/// assert_eq!(parse_amount("0.00000001").unwrap(), 1);
/// assert!(parse_amount("-1").is_err());
/// ```
pub fn parse_amount(text: &str) -> Result<u64> {
    let text = text.trim();
    let invalid = || BlockchainError::Validation(format!("Invalid amount: {text:?}"));

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > DECIMALS {
        return Err(BlockchainError::Validation(format!(
            "Amount {text:?} has more than {DECIMALS} decimal places"
        )));
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| invalid())?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = DECIMALS);
        padded.parse::<u64>().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(UNITS_PER_COIN)
        .and_then(|units| units.checked_add(fraction_units))
        .ok_or_else(|| BlockchainError::Validation(format!("Amount {text:?} is too large")))
}

/// Render minor units as a decimal coin amount without trailing zeros.
///
/// # Examples
/// ```
/// use ledger_chain::core::monetary::format_amount;
/// assert_eq!(format_amount(3_000_000_000), "30");
/// assert_eq!(format_amount(150_000_000), "1.5");
/// ```
pub fn format_amount(units: u64) -> String {
    let whole = units / UNITS_PER_COIN;
    let fraction = units % UNITS_PER_COIN;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}", width = DECIMALS);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
