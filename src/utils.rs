//! Utility functions for hex validation, hash formatting and Keccak-256.

use crate::error::DistributorError;
use crate::types::{Hash, HASH_SIZE};
use sha3::{Digest, Keccak256};

fn is_valid_hex_string(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .trim()
        .strip_prefix("0x")
        .or_else(|| input.trim().strip_prefix("0X"))
        .unwrap_or_else(|| input.trim())
}

/// Validates and strips hex prefix from a string.
///
/// # Arguments
///
/// * `input` - The hex string to validate (may include "0x" or "0X" prefix)
/// * `expected_len` - Expected length of the hex string after stripping prefix
///
/// # Errors
/// Returns [`DistributorError::Encoding`] if:
/// - The hex string has incorrect length
/// - The hex string contains non-hex characters
///
/// # Examples
///
/// ```
/// use merkle_distributor::utils::validate_and_strip_hex;
///
/// let result = validate_and_strip_hex("0x1234abcd", 8).unwrap();
/// assert_eq!(result, "1234abcd");
/// ```
pub fn validate_and_strip_hex(input: &str, expected_len: usize) -> Result<String, DistributorError> {
    let stripped = strip_hex_prefix(input);

    if stripped.len() != expected_len {
        return Err(DistributorError::Encoding(format!(
            "invalid hex string: must be {} characters (got {})",
            expected_len,
            stripped.len()
        )));
    }

    if !is_valid_hex_string(stripped) {
        return Err(DistributorError::Encoding(
            "invalid hex string: contains non-hex characters".to_string(),
        ));
    }

    Ok(stripped.to_string())
}

/// Formats a 32-byte hash as `0x`-prefixed lowercase hex.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parses a 32-byte hash from hex, with or without `0x`.
pub fn hash_from_hex(input: &str) -> Result<Hash, DistributorError> {
    let stripped = validate_and_strip_hex(input, HASH_SIZE * 2)?;
    let mut out = [0u8; HASH_SIZE];
    hex::decode_to_slice(stripped, &mut out)
        .map_err(|e| DistributorError::Encoding(format!("invalid hash hex '{input}': {e}")))?;
    Ok(out)
}

/// Keccak-256 over the concatenation of `parts`.
#[inline]
#[must_use]
pub fn keccak256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_and_strip_hex_valid() {
        let result = validate_and_strip_hex("0x1234abcd", 8);
        assert_eq!(result.unwrap(), "1234abcd");
    }

    #[test]
    fn test_validate_and_strip_hex_uppercase_prefix() {
        let result = validate_and_strip_hex("0X1234ABCD", 8);
        assert_eq!(result.unwrap(), "1234ABCD");
    }

    #[test]
    fn test_validate_and_strip_hex_with_whitespace() {
        let result = validate_and_strip_hex("  0x1234abcd  ", 8);
        assert_eq!(result.unwrap(), "1234abcd");
    }

    #[test]
    fn test_validate_and_strip_hex_wrong_length() {
        let result = validate_and_strip_hex("0x1234abcd", 10);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be 10 characters"));
    }

    #[test]
    fn test_validate_and_strip_hex_invalid_characters() {
        let result = validate_and_strip_hex("0x1234xyzw", 8);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("non-hex characters"));
    }

    #[test]
    fn test_hash_hex_round_trip() {
        let hash = [0xabu8; 32];
        let encoded = hash_to_hex(&hash);
        assert!(encoded.starts_with("0x"));
        assert_eq!(hash_from_hex(&encoded).unwrap(), hash);
        assert!(hash_from_hex("0x1234").is_err());
    }

    #[test]
    fn test_keccak256_empty_input() {
        // keccak256("") is a well-known constant.
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_concatenates_parts() {
        assert_eq!(keccak256(&[&b"ab"[..], &b"c"[..]]), keccak256(&[&b"abc"[..]]));
    }
}
