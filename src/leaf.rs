//! Leaf codec.
//!
//! A leaf commits to `(index, address, amount)`. The v1 preimage is the 84-byte
//! concatenation
//!
//! ```text
//! uint256(index) || address[20] || uint256(amount)
//! ```
//!
//! with both integers big-endian, hashed with Keccak-256. This is exactly
//! `keccak256(abi.encodePacked(uint256 index, address account, uint256 amount))`,
//! so an EVM verifier recomputes the same leaf bit-for-bit.
//!
//! Every committed root depends on this layout. A new layout gets a new
//! [`LeafEncoding`] variant; `V1` must never change.

use crate::ethereum::{Address, ADDRESS_SIZE};
use crate::types::{Amount, Hash, Leaf};
use crate::utils::keccak256;
use serde::{Deserialize, Serialize};

const WORD_SIZE: usize = 32;

pub const LEAF_PREIMAGE_SIZE: usize = WORD_SIZE + ADDRESS_SIZE + WORD_SIZE;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafEncoding {
    #[default]
    V1,
}

impl LeafEncoding {
    #[must_use]
    pub fn preimage(self, index: u64, address: &Address, amount: Amount) -> [u8; LEAF_PREIMAGE_SIZE] {
        match self {
            LeafEncoding::V1 => {
                let mut buf = [0u8; LEAF_PREIMAGE_SIZE];
                buf[WORD_SIZE - 8..WORD_SIZE].copy_from_slice(&index.to_be_bytes());
                buf[WORD_SIZE..WORD_SIZE + ADDRESS_SIZE].copy_from_slice(address.as_bytes());
                buf[LEAF_PREIMAGE_SIZE - 16..].copy_from_slice(&amount.to_be_bytes());
                buf
            }
        }
    }

    #[must_use]
    pub fn encode(self, index: u64, address: &Address, amount: Amount) -> Hash {
        keccak256(&[self.preimage(index, address, amount).as_slice()])
    }

    /// True when the stored `leaf_hash` still commits to the leaf's own fields.
    #[must_use]
    pub fn matches(self, leaf: &Leaf) -> bool {
        self.encode(leaf.index, &leaf.address, leaf.amount) == leaf.leaf_hash
    }
}

/// Hashes a leaf with the current encoding.
#[inline]
#[must_use]
pub fn encode_leaf(index: u64, address: &Address, amount: Amount) -> Hash {
    LeafEncoding::V1.encode(index, address, amount)
}
