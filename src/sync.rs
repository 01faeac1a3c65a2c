//! Chain reconciliation.
//!
//! Brings the stored claim flags, claim totals, timing window and status back
//! into agreement with the chain. The chain wins every disagreement except the
//! root: a root mismatch is an integrity failure and is surfaced, never repaired.
//!
//! All chain reads complete before anything is written, and the write is one
//! atomic store replace. A failed read therefore leaves the stored state exactly
//! as it was.

use crate::chain::{ChainReader, ClaimedSet};
use crate::clock::Clock;
use crate::error::{DistributorError, Result};
use crate::manager::LockRegistry;
use crate::merkle::{ordered_leaf_hashes, MerkleTree};
use crate::store::DistributionStore;
use crate::types::{Distribution, DistributionId, DistributionStatus, Hash, Leaf, Timestamp, TimingWindow};
use crate::utils::hash_to_hex;
use log::{debug, error, info};
use std::sync::Arc;

/// What the chain reported for one distribution, read in full before applying.
#[derive(Debug, Clone)]
struct ChainView {
    root: Option<Hash>,
    window: Option<TimingWindow>,
    claims: ClaimedSet,
}

pub struct Reconciler<S, R, C> {
    store: Arc<S>,
    reader: R,
    clock: C,
    locks: Arc<LockRegistry>,
}

impl<S, R, C> Reconciler<S, R, C>
where
    S: DistributionStore,
    R: ChainReader,
    C: Clock,
{
    pub fn new(store: Arc<S>, reader: R, clock: C, locks: Arc<LockRegistry>) -> Self {
        Self {
            store,
            reader,
            clock,
            locks,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Reconciles one distribution against the chain and returns the stored result.
    ///
    /// Idempotent: with no new chain activity a second run writes nothing.
    pub async fn sync(&self, id: DistributionId) -> Result<Distribution> {
        let _guard = self.locks.acquire(id).await?;

        let (distribution, leaves) = self
            .store
            .snapshot(id)?
            .ok_or(DistributorError::DistributionNotFound(id))?;

        check_stored_root(&distribution, &leaves)?;

        let view = self.read_chain(&distribution).await?;

        if let Some(chain_root) = view.root {
            if chain_root != distribution.merkle_root {
                error!(
                    "Distribution {} root mismatch: stored {}, on-chain {}",
                    id,
                    hash_to_hex(&distribution.merkle_root),
                    hash_to_hex(&chain_root)
                );
                return Err(DistributorError::integrity(
                    id,
                    format!(
                        "on-chain root {} differs from stored root {}",
                        hash_to_hex(&chain_root),
                        hash_to_hex(&distribution.merkle_root)
                    ),
                ));
            }
        }

        if distribution.status == DistributionStatus::Cancelled {
            if !view.claims.is_empty() {
                error!(
                    "Distribution {} is cancelled but the chain reports {} claims",
                    id,
                    view.claims.len()
                );
                return Err(DistributorError::integrity(
                    id,
                    format!("{} on-chain claims on a cancelled distribution", view.claims.len()),
                ));
            }
            debug!("Distribution {id} is cancelled; nothing to reconcile");
            return Ok(distribution);
        }

        let now = self.clock.now();
        let updated_leaves = apply_claims(id, &leaves, &view.claims, now)?;
        let updated = reconcile_distribution(&distribution, &updated_leaves, &view, now)?;

        let leaves_changed = updated_leaves != leaves;
        if !leaves_changed && updated == distribution {
            debug!("Distribution {id} already in sync");
            return Ok(distribution);
        }

        self.store
            .replace(updated.clone(), leaves_changed.then_some(updated_leaves))?;

        info!(
            "Synced distribution {}: status {} -> {}, claimed {}/{} ({} of {})",
            id,
            distribution.status,
            updated.status,
            updated.claimed_count,
            updated.total_recipients,
            updated.claimed_amount,
            updated.total_amount
        );
        Ok(updated)
    }

    async fn read_chain(&self, distribution: &Distribution) -> Result<ChainView> {
        let id = distribution.distribution_id;
        let root = self.reader.get_root(id).await?;
        let window = self.reader.get_timing_window(id).await?;
        // Nothing can be claimed before the root is committed.
        let claims = match root {
            Some(_) => {
                self.reader
                    .get_claimed_flags(id, distribution.total_recipients)
                    .await?
            }
            None => ClaimedSet::new(),
        };
        Ok(ChainView {
            root,
            window,
            claims,
        })
    }
}

/// Every stored leaf must still encode to its hash, and the hashes to the stored root.
fn check_stored_root(distribution: &Distribution, leaves: &[Leaf]) -> Result<()> {
    let id = distribution.distribution_id;
    if let Some(leaf) = leaves
        .iter()
        .find(|leaf| !distribution.leaf_encoding.matches(leaf))
    {
        error!(
            "Distribution {} leaf {} ({} / {}) no longer matches its hash {}",
            id,
            leaf.index,
            leaf.address,
            leaf.amount,
            hash_to_hex(&leaf.leaf_hash)
        );
        return Err(DistributorError::integrity(
            id,
            format!("leaf {} fields do not encode to its stored hash", leaf.index),
        ));
    }

    let recomputed = ordered_leaf_hashes(leaves)
        .and_then(MerkleTree::new)
        .map(|tree| tree.root)
        .ok_or_else(|| DistributorError::integrity(id, "stored leaves are not indexed 0..n"))?;

    if recomputed != distribution.merkle_root {
        error!(
            "Distribution {} stored leaves hash to {}, stored root is {}",
            id,
            hash_to_hex(&recomputed),
            hash_to_hex(&distribution.merkle_root)
        );
        return Err(DistributorError::integrity(
            id,
            "stored leaves no longer hash to the stored root",
        ));
    }
    Ok(())
}

/// Rewrites claim fields from chain evidence. Leaves keep prior claim details
/// when the chain supplies none, so repeated runs are stable.
fn apply_claims(id: DistributionId, leaves: &[Leaf], claims: &ClaimedSet, now: Timestamp) -> Result<Vec<Leaf>> {
    if let Some((&index, _)) = claims.range(leaves.len() as u64..).next() {
        return Err(DistributorError::integrity(
            id,
            format!("chain reports claim for index {index} beyond {} leaves", leaves.len()),
        ));
    }

    leaves
        .iter()
        .map(|leaf| {
            let mut next = leaf.clone();
            match claims.get(&leaf.index) {
                Some(record) => {
                    if record.account.is_some_and(|a| a != leaf.address)
                        || record.amount.is_some_and(|a| a != leaf.amount)
                    {
                        return Err(DistributorError::integrity(
                            id,
                            format!(
                                "claim for index {} does not match leaf {} / {}",
                                leaf.index, leaf.address, leaf.amount
                            ),
                        ));
                    }
                    next.claimed = true;
                    next.claimed_at = record.claimed_at.or(leaf.claimed_at).or(Some(now));
                    next.claim_tx_ref = record.tx_ref.clone().or_else(|| leaf.claim_tx_ref.clone());
                }
                None => {
                    next.claimed = false;
                    next.claimed_at = None;
                    next.claim_tx_ref = None;
                }
            }
            Ok(next)
        })
        .collect()
}

fn reconcile_distribution(
    distribution: &Distribution,
    leaves: &[Leaf],
    view: &ChainView,
    now: Timestamp,
) -> Result<Distribution> {
    let id = distribution.distribution_id;
    let mut next = distribution.clone();

    let claimed: Vec<&Leaf> = leaves.iter().filter(|l| l.claimed).collect();
    next.claimed_count = claimed.len() as u64;
    next.claimed_amount = claimed.iter().map(|l| l.amount).sum();

    if let Some(window) = view.window {
        next.start_time = window.start_time;
        next.end_time = window.end_time;
    }

    let confirmed = view.root.is_some();
    if !confirmed && distribution.status != DistributionStatus::Pending {
        return Err(DistributorError::integrity(
            id,
            format!("distribution is {} but no root is committed on-chain", distribution.status),
        ));
    }

    if next.status == DistributionStatus::Pending && confirmed && now >= next.start_time {
        info!("Distribution {id} confirmed on-chain, activating");
        next.status = DistributionStatus::Active;
    }
    if next.status == DistributionStatus::Active && (next.window().has_ended(now) || next.fully_claimed()) {
        info!("Distribution {id} completed");
        next.status = DistributionStatus::Completed;
    }

    Ok(next)
}
