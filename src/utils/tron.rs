use sha2::{Digest, Sha256};

use super::error::AppError;

/// Mainnet address version byte prepended to the 20-byte account id.
pub const ADDRESS_PREFIX: u8 = 0x41;

fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash1 = Sha256::digest(payload);
    let hash2 = Sha256::digest(hash1);
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash2[..4]);
    out
}

/// Base58check-encodes a 20-byte account id as a `T...` address.
pub fn account_to_tron_address(account: &[u8]) -> Result<String, AppError> {
    if account.len() != 20 {
        return Err(AppError::ParseError(format!(
            "Invalid Tron account length: {}",
            account.len()
        )));
    }
    let mut payload = Vec::with_capacity(25);
    payload.push(ADDRESS_PREFIX);
    payload.extend_from_slice(account);
    let sum = checksum(&payload);
    payload.extend_from_slice(&sum);
    Ok(bs58::encode(payload).into_string())
}

/// Converts `41`-prefixed 21-byte hex, or bare 20-byte hex, to base58.
pub fn hex_to_tron_address(hex: &str) -> Result<String, AppError> {
    let hex = hex.trim_start_matches("0x").trim_start_matches("0X");
    let account = match hex.len() {
        42 if hex.starts_with("41") => &hex[2..],
        40 => hex,
        _ => {
            return Err(AppError::ParseError(format!(
                "Invalid Tron address length: {}",
                hex
            )))
        }
    };
    let bytes = hex::decode(account).map_err(|e| AppError::ParseError(e.to_string()))?;
    account_to_tron_address(&bytes)
}

/// Canonical (base58) form of any accepted TRON address spelling.
///
/// Unrecognized input is returned trimmed but otherwise untouched, so a
/// malformed key can never collide with a real canonical address.
pub fn normalize_tron_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('T') {
        return trimmed.to_string();
    }
    hex_to_tron_address(trimmed).unwrap_or_else(|_| trimmed.to_string())
}

/// Recovers the address held in the low 20 bytes of a 32-byte log topic.
pub fn topic_to_tron_address(topic: &str) -> Result<String, AppError> {
    let topic = topic.trim_start_matches("0x");
    if !topic.is_ascii() || topic.len() != 64 {
        return Err(AppError::ParseError(format!(
            "Invalid topic length: {}",
            topic
        )));
    }
    hex_to_tron_address(&topic[24..])
}
