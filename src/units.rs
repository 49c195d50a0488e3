//! Token amount formatting
//!
//! Vote balances are kept as 256-bit integers in the token's smallest unit.
//! These helpers render them as human-readable decimal strings and parse
//! decimal input back, without ever going through floating point.

use alloy_primitives::{I256, U256};
use anyhow::Result;

/// Decimals used for every human-readable vote balance.
pub const DECIMALS: u8 = 18;

/// Compute 10^decimals.
fn ten_pow(decimals: u8) -> U256 {
    let ten = U256::from(10u64);
    (0..decimals).fold(U256::from(1u64), |acc, _| acc * ten)
}

/// Format a raw amount as a decimal string scaled down by `decimals`.
///
/// Trailing zeros of the fraction are trimmed but at least one fraction
/// digit is always kept: `1e18` with 18 decimals is `"1.0"`, zero is `"0.0"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let base = ten_pow(decimals);
    let whole = value / base;
    let fraction = value % base;

    let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let trimmed = padded.trim_end_matches('0');
    let fraction = if trimmed.is_empty() { "0" } else { trimmed };

    format!("{}.{}", whole, fraction)
}

/// [`format_units`] for a signed amount; negative values get a `-` prefix.
pub fn format_signed_units(value: I256, decimals: u8) -> String {
    let magnitude = format_units(value.unsigned_abs(), decimals);
    if value.is_negative() {
        format!("-{}", magnitude)
    } else {
        magnitude
    }
}

/// Parse a base-10 integer string into a raw amount.
///
/// Rejects signs, decimal points and anything that overflows 256 bits.
pub fn parse_raw_amount(s: &str) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("Not a non-negative integer: {:?}", s);
    }
    U256::from_str_radix(s, 10).map_err(|e| anyhow::anyhow!("Integer out of range: {} ({})", s, e))
}
