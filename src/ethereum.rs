//! Ethereum address validation and normalization.
//!
//! Every address entering the engine passes through [`Address::parse`], so the
//! rest of the crate only ever sees the canonical 20-byte form. Display and
//! serialization always produce lowercase `0x`-prefixed hex.

use crate::error::DistributorError;
use crate::utils::validate_and_strip_hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Expected length of an Ethereum address in hex characters (excluding 0x prefix)
pub const ADDRESS_HEX_LENGTH: usize = 40;

pub const ADDRESS_SIZE: usize = 20;

/// A 20-byte account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses an address with or without `0x`, in any hex case.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not exactly 40 hex characters
    /// (excluding the prefix) or contains non-hex characters. The zero
    /// address parses; rejecting it is the validator's decision.
    ///
    /// # Examples
    ///
    /// ```
    /// use merkle_distributor::ethereum::Address;
    ///
    /// let addr = Address::parse("0x742d35Cc6634C0532925a3b844Bc454e4438f44e").unwrap();
    /// assert_eq!(addr.to_string(), "0x742d35cc6634c0532925a3b844bc454e4438f44e");
    /// ```
    pub fn parse(address: &str) -> Result<Self, DistributorError> {
        let stripped = validate_and_strip_hex(address, ADDRESS_HEX_LENGTH)
            .map_err(|e| DistributorError::Encoding(format!("invalid address '{address}': {e}")))?;
        let mut bytes = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(stripped, &mut bytes)
            .map_err(|e| DistributorError::Encoding(format!("invalid address '{address}': {e}")))?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = DistributorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Normalizes an address string to lowercase `0x` form.
///
/// # Examples
///
/// ```
/// use merkle_distributor::ethereum::normalize_address;
///
/// let normalized = normalize_address("742D35CC6634C0532925A3B844BC454E4438F44E").unwrap();
/// assert_eq!(normalized, "0x742d35cc6634c0532925a3b844bc454e4438f44e");
/// ```
pub fn normalize_address(address: &str) -> Result<String, DistributorError> {
    Address::parse(address).map(|a| a.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_valid() {
        let addr = Address::parse("0x742d35Cc6634C0532925a3b844Bc454e4438f44e").unwrap();
        assert_eq!(addr.to_string(), "0x742d35cc6634c0532925a3b844bc454e4438f44e");
    }

    #[test]
    fn test_parse_address_no_prefix() {
        let a = Address::parse("742d35Cc6634C0532925a3b844Bc454e4438f44e").unwrap();
        let b = Address::parse("0X742D35CC6634C0532925A3B844BC454E4438F44E").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_address_invalid_length() {
        assert!(Address::parse("0x742d35Cc6634C0532925a3b844Bc454e4438").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_parse_address_invalid_hex() {
        assert!(Address::parse("0x742d35Cc6634C0532925a3b844Bc454e4438f44g").is_err());
    }

    #[test]
    fn test_zero_address_parses_but_is_flagged() {
        let zero = Address::parse("0x0000000000000000000000000000000000000000").unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, Address::ZERO);
    }

    #[test]
    fn test_serde_uses_normalized_string() {
        let addr = Address::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<Address>("\"0x12\"").is_err());
    }
}
