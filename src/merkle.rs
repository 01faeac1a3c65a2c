//! Merkle tree builder.
//!
//! Binary Keccak-256 tree with sorted-pair parents: `H(min(a, b) || max(a, b))`.
//! A level with an odd node count pairs its last node with itself. Both rules
//! match the sorted-pair verifiers deployed by EVM (`MerkleProof.verify`) and
//! Solana token distributors, so a proof from [`MerkleTree::generate_proof`]
//! needs no position bits.

use crate::leaf::encode_leaf;
use crate::types::{Allocation, Hash, Leaf};
use crate::utils::{hash_to_hex, keccak256};
use std::fmt;

/// A Merkle proof for leaf inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub root: Hash,
    pub siblings: Vec<Hash>,
    pub index: usize,
}

/// A binary Merkle tree with every level retained.
///
/// `levels[0]` holds the leaf hashes, the last level holds the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    pub root: Hash,
    levels: Vec<Vec<Hash>>,
}

/// Parent hash of two children, order-independent.
#[must_use]
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        keccak256(&[a.as_slice(), b.as_slice()])
    } else {
        keccak256(&[b.as_slice(), a.as_slice()])
    }
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|chunk| {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left);
            hash_pair(left, right)
        })
        .collect()
}

impl MerkleTree {
    /// Builds a tree over `leaves` in the given order.
    ///
    /// Returns `None` for an empty leaf list; a single leaf is its own root.
    #[must_use]
    pub fn new(leaves: Vec<Hash>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = vec![leaves];
        while let Some(parent) = levels.last().filter(|l| l.len() > 1).map(|l| next_level(l)) {
            levels.push(parent);
        }

        let root = levels.last()?.first().copied()?;
        Some(MerkleTree { root, levels })
    }

    #[must_use]
    pub fn leaves(&self) -> &[Hash] {
        &self.levels[0]
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of hashing levels above the leaves, `ceil(log2(n))`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Generate a Merkle proof for the leaf at `leaf_index`.
    ///
    /// Siblings are ordered bottom-up. When a node has no right neighbour it
    /// was hashed with itself, so it appears as its own sibling.
    #[must_use]
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels[0].get(leaf_index)?;

        let mut siblings = Vec::with_capacity(self.depth());
        let mut index = leaf_index;
        for level in &self.levels[..self.depth()] {
            let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
            siblings.push(*level.get(sibling_index).unwrap_or(&level[index]));
            index /= 2;
        }

        Some(MerkleProof {
            leaf,
            root: self.root,
            siblings,
            index: leaf_index,
        })
    }

    /// Verify a Merkle proof against this tree's root.
    #[must_use]
    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        proof.root == self.root && verify(&proof.leaf, &proof.siblings, &self.root)
    }
}

/// Folds `siblings` into `leaf` with [`hash_pair`] and compares against `root`.
///
/// This mirrors the on-chain verifier and is what a claim ultimately has to pass.
#[must_use]
pub fn verify(leaf: &Hash, siblings: &[Hash], root: &Hash) -> bool {
    let computed = siblings
        .iter()
        .fold(*leaf, |acc, sibling| hash_pair(&acc, sibling));
    &computed == root
}

/// Output of [`build`]: the root, the tree levels and the indexed leaf records.
#[derive(Debug, Clone)]
pub struct BuiltTree {
    pub tree: MerkleTree,
    pub leaves: Vec<Leaf>,
}

impl BuiltTree {
    #[must_use]
    pub fn root(&self) -> Hash {
        self.tree.root
    }
}

/// Assigns indices in input order, hashes every allocation and builds the tree.
///
/// Input order is part of the commitment: the same multiset in another order
/// yields another root.
#[must_use]
pub fn build(allocations: &[Allocation]) -> Option<BuiltTree> {
    let leaves: Vec<Leaf> = allocations
        .iter()
        .enumerate()
        .map(|(i, alloc)| {
            let index = i as u64;
            Leaf {
                index,
                address: alloc.address,
                amount: alloc.amount,
                leaf_hash: encode_leaf(index, &alloc.address, alloc.amount),
                claimed: false,
                claimed_at: None,
                claim_tx_ref: None,
            }
        })
        .collect();

    let tree = MerkleTree::new(leaves.iter().map(|l| l.leaf_hash).collect())?;
    Some(BuiltTree { tree, leaves })
}

/// Recomputes the proof for `index` from stored leaves.
///
/// Leaves must be sorted by index with no gaps; anything else returns `None`.
#[must_use]
pub fn prove_index(leaves: &[Leaf], index: u64) -> Option<MerkleProof> {
    let hashes = ordered_leaf_hashes(leaves)?;
    MerkleTree::new(hashes)?.generate_proof(usize::try_from(index).ok()?)
}

/// Leaf hashes in index order, or `None` if the stored indices are not `0..n`.
#[must_use]
pub fn ordered_leaf_hashes(leaves: &[Leaf]) -> Option<Vec<Hash>> {
    leaves
        .iter()
        .enumerate()
        .map(|(pos, leaf)| (leaf.index == pos as u64).then_some(leaf.leaf_hash))
        .collect()
}

impl fmt::Display for MerkleProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MerkleProof:\n  Leaf: {}\n  Root: {}\n  Index: {}\n  Siblings: {}",
            hash_to_hex(&self.leaf),
            hash_to_hex(&self.root),
            self.index,
            self.siblings.len()
        )
    }
}
