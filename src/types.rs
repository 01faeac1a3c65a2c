//! Domain types shared across the engine.

use crate::ethereum::Address;
use crate::leaf::LeafEncoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const HASH_SIZE: usize = 32;

pub const SECONDS_PER_DAY: u64 = 86_400;

pub type Hash = [u8; HASH_SIZE];

pub type DistributionId = u64;

/// Token quantity in the smallest unit.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// An allocation entry as supplied by the administrative caller, before validation.
///
/// Both fields are kept as text so the validator can report every malformed
/// entry instead of failing on the first parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInput {
    pub address: String,
    #[serde(deserialize_with = "serde_amount::deserialize_raw")]
    pub amount: String,
}

impl AllocationInput {
    pub fn new(address: impl Into<String>, amount: impl ToString) -> Self {
        Self {
            address: address.into(),
            amount: amount.to_string(),
        }
    }
}

/// A validated allocation: parsed address and strictly positive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub address: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
}

/// Funding source category of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultType {
    Treasury,
    LiquidityMining,
    Staking,
    Ecosystem,
    Partnership,
}

impl fmt::Display for VaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VaultType::Treasury => "treasury",
            VaultType::LiquidityMining => "liquidity_mining",
            VaultType::Staking => "staking",
            VaultType::Ecosystem => "ecosystem",
            VaultType::Partnership => "partnership",
        };
        f.write_str(s)
    }
}

impl FromStr for VaultType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "treasury" => Ok(VaultType::Treasury),
            "liquidity_mining" => Ok(VaultType::LiquidityMining),
            "staking" => Ok(VaultType::Staking),
            "ecosystem" => Ok(VaultType::Ecosystem),
            "partnership" => Ok(VaultType::Partnership),
            other => Err(format!("unknown vault type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl DistributionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Reference to the confirmed on-chain commit transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainRef {
    pub tx_hash: String,
    pub block_number: u64,
}

/// Claim window, `[start_time, end_time)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingWindow {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl TimingWindow {
    #[must_use]
    pub fn contains(&self, now: Timestamp) -> bool {
        self.start_time <= now && now < self.end_time
    }

    #[must_use]
    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }
}

/// One recipient's entry in a distribution.
///
/// `index`, `address`, `amount` and `leaf_hash` are fixed at tree-build time;
/// only the claim fields are ever rewritten, and only by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub index: u64,
    pub address: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    #[serde(with = "serde_hash")]
    pub leaf_hash: Hash,
    pub claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_tx_ref: Option<String>,
}

/// Aggregate record for one committed Merkle distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub distribution_id: DistributionId,
    #[serde(with = "serde_hash")]
    pub merkle_root: Hash,
    pub leaf_encoding: LeafEncoding,
    pub vault_type: VaultType,
    #[serde(with = "serde_amount")]
    pub total_amount: Amount,
    pub total_recipients: u64,
    pub claimed_count: u64,
    #[serde(with = "serde_amount")]
    pub claimed_amount: Amount,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: DistributionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_ref: Option<OnchainRef>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Distribution {
    #[must_use]
    pub fn window(&self) -> TimingWindow {
        TimingWindow {
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    #[must_use]
    pub fn fully_claimed(&self) -> bool {
        self.total_recipients > 0 && self.claimed_count == self.total_recipients
    }
}

/// Proof material a recipient submits on-chain. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    pub distribution_id: DistributionId,
    pub address: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub index: u64,
    #[serde(with = "serde_hash")]
    pub leaf_hash: Hash,
    #[serde(with = "serde_hash::vec")]
    pub proof: Vec<Hash>,
    #[serde(with = "serde_hash")]
    pub root: Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum IneligibleReason {
    NoAllocation,
    AlreadyClaimed,
    NotActive { status: DistributionStatus },
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Leaf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibleReason>,
}

impl Eligibility {
    #[must_use]
    pub fn eligible(leaf: Leaf) -> Self {
        Self {
            eligible: true,
            allocation: Some(leaf),
            reason: None,
        }
    }

    #[must_use]
    pub fn not_eligible(allocation: Option<Leaf>, reason: IneligibleReason) -> Self {
        Self {
            eligible: false,
            allocation,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Inclusive creation-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl DateRange {
    #[must_use]
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionFilter {
    pub status: Option<DistributionStatus>,
    pub vault_type: Option<VaultType>,
    pub created: Option<DateRange>,
}

impl DistributionFilter {
    #[must_use]
    pub fn matches(&self, d: &Distribution) -> bool {
        self.status.map_or(true, |s| d.status == s)
            && self.vault_type.map_or(true, |v| d.vault_type == v)
            && self.created.map_or(true, |r| r.contains(d.created_at))
    }
}

/// Amounts travel as decimal strings so consumers without 128-bit integers keep precision.
pub mod serde_amount {
    use super::Amount;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = deserialize_raw(deserializer)?;
        raw.parse::<Amount>()
            .map_err(|e| D::Error::custom(format!("invalid amount '{raw}': {e}")))
    }

    /// Accepts a JSON string or number and keeps its textual form.
    pub fn deserialize_raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!(
                "amount must be a string or number, got {other}"
            ))),
        }
    }
}

/// 32-byte hashes travel as `0x`-prefixed hex.
pub mod serde_hash {
    use super::Hash;
    use crate::utils::{hash_from_hex, hash_to_hex};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash_to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        hash_from_hex(&s).map_err(D::Error::custom)
    }

    pub mod vec {
        use super::*;
        use serde::ser::SerializeSeq;

        pub fn serialize<S: Serializer>(hashes: &[Hash], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
            for hash in hashes {
                seq.serialize_element(&hash_to_hex(hash))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash>, D::Error> {
            let raw = Vec::<String>::deserialize(deserializer)?;
            raw.iter()
                .map(|s| hash_from_hex(s).map_err(D::Error::custom))
                .collect()
        }
    }
}
