use crate::utils::error::AppError;
use dashmap::DashMap;
use num_bigint::BigUint;
use num_traits::{Num, Zero};
use std::sync::OnceLock;

static TEN_POWERS: OnceLock<DashMap<u8, BigUint>> = OnceLock::new();

fn ten_pow(decimals: u8) -> BigUint {
    let powers = TEN_POWERS.get_or_init(DashMap::new);
    if let Some(pow) = powers.get(&decimals) {
        return pow.clone();
    }
    let pow = BigUint::from(10u32).pow(u32::from(decimals));
    powers.insert(decimals, pow.clone());
    pow
}

/// Formats `value / 10^decimals` as an exact base-10 string.
///
/// Trailing fractional zeros are dropped, so `1500000` with 6 decimals is
/// `"1.5"` and an integral result carries no decimal point at all.
pub fn scale_amount(value: &BigUint, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let pow = ten_pow(decimals);
    let int_part = value / &pow;
    let frac_part = value % &pow;
    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let frac = format!(
        "{:0>width$}",
        frac_part.to_string(),
        width = usize::from(decimals)
    );
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Parses a hex quantity with or without the `0x` prefix. An empty body is zero.
pub fn parse_hex_biguint(value: &str) -> Result<BigUint, AppError> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(BigUint::zero());
    }
    BigUint::from_str_radix(digits, 16)
        .map_err(|e| AppError::ParseError(format!("Invalid hex amount {}: {}", value, e)))
}

pub fn parse_hex_u64(value: &str) -> Result<u64, AppError> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16)
        .map_err(|e| AppError::ParseError(format!("Failed to parse hex number {}: {}", value, e)))
}
