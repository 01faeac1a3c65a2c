//! File formats used by the command-line tools.
//!
//! Allocation files are either CSV (`address,amount` per line, optional header,
//! `#` comments) or a JSON array of `{ "address", "amount" }` objects. The tree
//! document written by `build-tree` carries every leaf's claim, and a single
//! [`ClaimEntry`] is what `verify-claim` reads back.

use crate::config::InputConfig;
use crate::ethereum::Address;
use crate::leaf::{encode_leaf, LeafEncoding};
use crate::merkle::{self, BuiltTree};
use crate::types::{serde_amount, serde_hash, AllocationInput, Amount, Hash};
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Reads an allocation file, refusing files larger than the configured limit.
pub fn load_allocations(path: &Path, config: &InputConfig) -> Result<Vec<AllocationInput>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read allocation file metadata: {}", path.display()))?;
    if metadata.len() > config.max_file_size {
        bail!(
            "Allocation file too large: {} bytes (max {} bytes)",
            metadata.len(),
            config.max_file_size
        );
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read allocation file: {}", path.display()))?;
    let inputs = parse_allocations(&content)
        .with_context(|| format!("Failed to parse allocation file: {}", path.display()))?;

    debug!("Loaded {} allocation entries from {}", inputs.len(), path.display());
    Ok(inputs)
}

/// Parses allocation text, choosing JSON when it starts with `[`.
pub fn parse_allocations(content: &str) -> Result<Vec<AllocationInput>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).context("Invalid JSON allocation list");
    }
    parse_csv(content)
}

fn parse_csv(content: &str) -> Result<Vec<AllocationInput>> {
    let mut inputs = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (address, amount) = line
            .split_once(',')
            .ok_or_else(|| anyhow!("line {}: expected 'address,amount'", n + 1))?;
        let (address, amount) = (address.trim(), amount.trim());
        if inputs.is_empty() && address.eq_ignore_ascii_case("address") {
            continue;
        }
        // Malformed values are left for the validator to report with their index.
        inputs.push(AllocationInput::new(address, amount));
    }
    Ok(inputs)
}

/// Everything a recipient needs to claim: the leaf fields, its proof and the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub index: u64,
    pub address: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    #[serde(with = "serde_hash::vec")]
    pub proof: Vec<Hash>,
    #[serde(with = "serde_hash")]
    pub root: Hash,
}

impl ClaimEntry {
    /// Re-encodes the leaf from its fields and checks the proof against `root`.
    #[must_use]
    pub fn verify(&self) -> bool {
        let leaf = encode_leaf(self.index, &self.address, self.amount);
        merkle::verify(&leaf, &self.proof, &self.root)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read claim file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse claim file: {}", path.display()))
    }
}

/// Output of `build-tree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(with = "serde_hash")]
    pub root: Hash,
    pub leaf_encoding: LeafEncoding,
    pub total_recipients: u64,
    #[serde(with = "serde_amount")]
    pub total_amount: Amount,
    pub depth: usize,
    pub claims: Vec<ClaimEntry>,
}

impl TreeDocument {
    pub fn from_built(built: &BuiltTree) -> Result<Self> {
        let root = built.root();
        let claims = built
            .leaves
            .iter()
            .map(|leaf| -> Result<ClaimEntry> {
                let position = usize::try_from(leaf.index)?;
                let proof = built
                    .tree
                    .generate_proof(position)
                    .ok_or_else(|| anyhow!("no proof for leaf {}", leaf.index))?;
                Ok(ClaimEntry {
                    index: leaf.index,
                    address: leaf.address,
                    amount: leaf.amount,
                    proof: proof.siblings,
                    root,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root,
            leaf_encoding: LeafEncoding::V1,
            total_recipients: built.leaves.len() as u64,
            total_amount: built.leaves.iter().map(|l| l.amount).sum(),
            depth: built.tree.depth(),
            claims,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize tree to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write tree file: {}", path.display()))
    }
}
