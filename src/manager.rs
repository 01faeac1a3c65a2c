//! Distribution lifecycle manager.
//!
//! ```text
//! pending --(commit confirmed, window open)--> active --(window over | all claimed)--> completed
//! pending | active --(admin cancel, no claims)--> cancelled
//! ```
//!
//! Mutating operations (`cancel_distribution`, `record_commit` and
//! reconciliation) hold a per-distribution async lock for their whole run.
//! Reads take no lock and see whatever snapshot the store last committed.

use crate::chain::ChainReader;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{DistributorError, Result};
use crate::ethereum::Address;
use crate::leaf::LeafEncoding;
use crate::merkle::{build, prove_index};
use crate::store::DistributionStore;
use crate::sync::Reconciler;
use crate::types::{
    ClaimProof, Distribution, DistributionFilter, DistributionId, DistributionStatus, Eligibility,
    Hash, IneligibleReason, Leaf, OnchainRef, Page, Pagination, VaultType, SECONDS_PER_DAY,
};
use crate::utils::hash_to_hex;
use crate::validator::{AllocationValidator, ValidatedAllocations, ValidationIssue, ValidationReport};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-distribution mutual exclusion for mutating operations.
///
/// Only ids with a holder or a waiter keep an entry: idle locks are pruned on
/// the next `acquire`, so the map is bounded by the number of in-flight ids.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<DistributionId, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub async fn acquire(&self, id: DistributionId) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| DistributorError::Storage("lock registry poisoned".to_string()))?;
            // A count of one means only the map holds it: nobody owns or awaits it.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Returned by [`DistributionManager::create_distribution`]; `root` goes on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDistribution {
    pub distribution: Distribution,
    pub root: Hash,
    pub leaf_count: u64,
}

pub struct DistributionManager<S, C> {
    store: Arc<S>,
    clock: C,
    config: Config,
    validator: AllocationValidator,
    locks: Arc<LockRegistry>,
}

impl<S, C> DistributionManager<S, C>
where
    S: DistributionStore,
    C: Clock + Clone,
{
    pub fn new(store: Arc<S>, clock: C, config: Config) -> Self {
        let validator = AllocationValidator::new(config.validation.clone());
        Self {
            store,
            clock,
            config,
            validator,
            locks: Arc::new(LockRegistry::default()),
        }
    }

    /// Validator configured with this manager's limits.
    pub fn validator(&self) -> &AllocationValidator {
        &self.validator
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reconciler sharing this manager's store, clock and per-id locks.
    pub fn reconciler<R: ChainReader>(&self, reader: R) -> Reconciler<S, R, C> {
        Reconciler::new(
            Arc::clone(&self.store),
            reader,
            self.clock.clone(),
            Arc::clone(&self.locks),
        )
    }

    /// Builds the tree and persists a pending distribution with all its leaves.
    ///
    /// The list is re-checked against this manager's validation limits, and
    /// nothing is stored unless the whole tree was built. `duration_days`
    /// defaults to the configured value.
    pub fn create_distribution(
        &self,
        allocations: ValidatedAllocations,
        vault_type: VaultType,
        duration_days: Option<u64>,
        metadata: BTreeMap<String, String>,
    ) -> Result<CreatedDistribution> {
        self.validator.check_limits(&allocations)?;
        let days = duration_days.unwrap_or(self.config.distribution.default_duration_days);
        self.validator
            .check_duration(days, self.config.distribution.max_duration_days)?;

        let built = build(allocations.as_slice()).ok_or_else(|| {
            DistributorError::Validation(ValidationReport::single(
                ValidationIssue::EmptyAllocationList,
            ))
        })?;

        let root = built.root();
        let leaf_count = built.leaves.len() as u64;
        let total_amount = built.leaves.iter().map(|l| l.amount).sum();
        let now = self.clock.now();
        let id = self.store.next_id()?;

        let distribution = Distribution {
            distribution_id: id,
            merkle_root: root,
            leaf_encoding: LeafEncoding::V1,
            vault_type,
            total_amount,
            total_recipients: leaf_count,
            claimed_count: 0,
            claimed_amount: 0,
            start_time: now,
            end_time: now.saturating_add(days.saturating_mul(SECONDS_PER_DAY)),
            status: DistributionStatus::Pending,
            onchain_ref: None,
            created_at: now,
            metadata,
        };

        self.store.insert(distribution.clone(), built.leaves)?;
        info!(
            "Created distribution {} ({}): {} recipients, total {}, root {}",
            id,
            vault_type,
            leaf_count,
            total_amount,
            hash_to_hex(&root)
        );

        Ok(CreatedDistribution {
            distribution,
            root,
            leaf_count,
        })
    }

    pub fn get_distribution(&self, id: DistributionId) -> Result<Distribution> {
        self.store
            .get(id)?
            .ok_or(DistributorError::DistributionNotFound(id))
    }

    /// Filtered listing, newest first. The page size is clamped to the configured maximum.
    pub fn list_distributions(
        &self,
        filter: &DistributionFilter,
        page: Option<Pagination>,
    ) -> Result<Page<Distribution>> {
        self.store.list(filter, self.clamp(page))
    }

    /// Leaves in index order, for administrative inspection.
    pub fn list_leaves(&self, id: DistributionId, page: Option<Pagination>) -> Result<Page<Leaf>> {
        self.store
            .leaves(id, self.clamp(page))?
            .ok_or(DistributorError::DistributionNotFound(id))
    }

    fn clamp(&self, page: Option<Pagination>) -> Pagination {
        let cfg = &self.config.distribution;
        let page = page.unwrap_or(Pagination::new(0, cfg.default_page_size));
        Pagination::new(page.offset, page.limit.min(cfg.max_page_size))
    }

    /// Eligible iff the address has an unclaimed leaf, the distribution is
    /// active, and now is inside `[start_time, end_time)`.
    pub fn check_eligibility(&self, id: DistributionId, address: &Address) -> Result<Eligibility> {
        let (distribution, leaf) = self
            .store
            .lookup(id, address)?
            .ok_or(DistributorError::DistributionNotFound(id))?;

        let Some(leaf) = leaf else {
            debug!("Address {address} has no allocation in distribution {id}");
            return Ok(Eligibility::not_eligible(None, IneligibleReason::NoAllocation));
        };

        if leaf.claimed {
            return Ok(Eligibility::not_eligible(Some(leaf), IneligibleReason::AlreadyClaimed));
        }
        if distribution.status != DistributionStatus::Active {
            return Ok(Eligibility::not_eligible(
                Some(leaf),
                IneligibleReason::NotActive {
                    status: distribution.status,
                },
            ));
        }
        if !distribution.window().contains(self.clock.now()) {
            return Ok(Eligibility::not_eligible(Some(leaf), IneligibleReason::OutsideWindow));
        }
        Ok(Eligibility::eligible(leaf))
    }

    /// Recomputes the proof from stored leaves. `Ok(None)` when the address has no leaf.
    pub fn get_proof(&self, id: DistributionId, address: &Address) -> Result<Option<ClaimProof>> {
        let (distribution, leaves) = self
            .store
            .snapshot(id)?
            .ok_or(DistributorError::DistributionNotFound(id))?;

        let Some(leaf) = leaves.iter().find(|l| l.address == *address) else {
            return Ok(None);
        };
        if !distribution.leaf_encoding.matches(leaf) {
            warn!(
                "Distribution {} leaf {} for {} no longer matches its hash",
                id, leaf.index, address
            );
            return Err(DistributorError::integrity(
                id,
                format!("leaf {} fields do not encode to its stored hash", leaf.index),
            ));
        }

        let proof = prove_index(&leaves, leaf.index)
            .ok_or_else(|| DistributorError::integrity(id, "stored leaves are not indexed 0..n"))?;
        if proof.root != distribution.merkle_root {
            warn!(
                "Distribution {} stored root {} disagrees with recomputed {}",
                id,
                hash_to_hex(&distribution.merkle_root),
                hash_to_hex(&proof.root)
            );
            return Err(DistributorError::integrity(
                id,
                "recomputed root differs from stored root",
            ));
        }

        Ok(Some(ClaimProof {
            distribution_id: id,
            address: leaf.address,
            amount: leaf.amount,
            index: leaf.index,
            leaf_hash: leaf.leaf_hash,
            proof: proof.siblings,
            root: distribution.merkle_root,
        }))
    }

    /// Records the confirmed commit transaction on a pending distribution.
    ///
    /// Repeating the same reference is a no-op; a different one is a conflict.
    pub async fn record_commit(&self, id: DistributionId, onchain_ref: OnchainRef) -> Result<Distribution> {
        let _guard = self.locks.acquire(id).await?;
        let mut distribution = self.get_distribution(id)?;

        if distribution.status != DistributionStatus::Pending {
            return Err(DistributorError::state_conflict(
                id,
                distribution.status,
                "commit can only be recorded while pending",
            ));
        }
        match &distribution.onchain_ref {
            Some(existing) if *existing == onchain_ref => return Ok(distribution),
            Some(existing) => {
                return Err(DistributorError::state_conflict(
                    id,
                    distribution.status,
                    format!("commit already recorded as {}", existing.tx_hash),
                ))
            }
            None => {}
        }

        info!(
            "Distribution {} commit recorded: tx {} at block {}",
            id, onchain_ref.tx_hash, onchain_ref.block_number
        );
        distribution.onchain_ref = Some(onchain_ref);
        self.store.replace(distribution.clone(), None)?;
        Ok(distribution)
    }

    /// Cancels a pending or active distribution that has no recorded claims.
    pub async fn cancel_distribution(&self, id: DistributionId) -> Result<Distribution> {
        let _guard = self.locks.acquire(id).await?;
        let mut distribution = self.get_distribution(id)?;

        if distribution.status.is_terminal() {
            return Err(DistributorError::state_conflict(
                id,
                distribution.status,
                "only pending or active distributions can be cancelled",
            ));
        }
        if distribution.claimed_count > 0 {
            warn!(
                "Refusing to cancel distribution {} with {} recorded claims",
                id, distribution.claimed_count
            );
            return Err(DistributorError::state_conflict(
                id,
                distribution.status,
                format!("{} claims already recorded", distribution.claimed_count),
            ));
        }

        distribution.status = DistributionStatus::Cancelled;
        self.store.replace(distribution.clone(), None)?;
        info!("Cancelled distribution {id}");
        Ok(distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::types::AllocationInput;

    const A: &str = "0x000000000000000000000000000000000000000a";
    const B: &str = "0x000000000000000000000000000000000000000b";
    const C: &str = "0x000000000000000000000000000000000000000c";

    fn manager() -> (DistributionManager<MemoryStore, Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let mgr = DistributionManager::new(Arc::new(MemoryStore::new()), clock.clone(), Config::default());
        (mgr, clock)
    }

    fn create(mgr: &DistributionManager<MemoryStore, Arc<ManualClock>>) -> CreatedDistribution {
        let inputs = vec![
            AllocationInput::new(A, 100),
            AllocationInput::new(B, 200),
            AllocationInput::new(C, 50),
        ];
        let validated = mgr.validator().validated(&inputs).unwrap();
        mgr.create_distribution(validated, VaultType::Treasury, Some(10), BTreeMap::new())
            .unwrap()
    }

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn test_create_persists_pending_with_totals() {
        let (mgr, _) = manager();
        let created = create(&mgr);
        let d = &created.distribution;

        assert_eq!(d.status, DistributionStatus::Pending);
        assert_eq!(created.leaf_count, 3);
        assert_eq!(d.total_recipients, 3);
        assert_eq!(d.total_amount, 350);
        assert_eq!(d.end_time - d.start_time, 10 * SECONDS_PER_DAY);
        assert_eq!(created.root, d.merkle_root);

        let leaves = mgr.list_leaves(d.distribution_id, None).unwrap();
        assert_eq!(leaves.total, 3);
        let sum: u128 = leaves.items.iter().map(|l| l.amount).sum();
        assert_eq!(sum, d.total_amount);
        assert_eq!(mgr.get_distribution(d.distribution_id).unwrap(), *d);
    }

    #[test]
    fn test_create_rejects_bad_duration() {
        let (mgr, _) = manager();
        let validated = mgr
            .validator()
            .validated(&[AllocationInput::new(A, 1)])
            .unwrap();
        let err = mgr
            .create_distribution(validated, VaultType::Staking, Some(0), BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, DistributorError::Validation(_)));
        assert_eq!(
            mgr.list_distributions(&DistributionFilter::default(), None)
                .unwrap()
                .total,
            0
        );
    }

    #[test]
    fn test_create_enforces_manager_limits_on_foreign_validation() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let mut config = Config::default();
        config.validation.max_recipients = 2;
        let mgr = DistributionManager::new(Arc::new(MemoryStore::new()), clock, config);

        let inputs = vec![
            AllocationInput::new(A, 100),
            AllocationInput::new(B, 200),
            AllocationInput::new(C, 50),
        ];
        let validated = AllocationValidator::default().validated(&inputs).unwrap();
        let err = mgr
            .create_distribution(validated, VaultType::Treasury, None, BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, DistributorError::Validation(_)));
        assert_eq!(
            mgr.list_distributions(&DistributionFilter::default(), None)
                .unwrap()
                .total,
            0
        );
    }

    #[test]
    fn test_unknown_distribution_is_not_found() {
        let (mgr, _) = manager();
        assert!(mgr.get_distribution(42).unwrap_err().is_not_found());
        assert!(mgr.check_eligibility(42, &addr(A)).unwrap_err().is_not_found());
        assert!(mgr.get_proof(42, &addr(A)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_pending_distribution_is_not_claimable() {
        let (mgr, _) = manager();
        let id = create(&mgr).distribution.distribution_id;
        let e = mgr.check_eligibility(id, &addr(A)).unwrap();
        assert!(!e.eligible);
        assert_eq!(
            e.reason,
            Some(IneligibleReason::NotActive {
                status: DistributionStatus::Pending
            })
        );
        assert_eq!(e.allocation.unwrap().amount, 100);
    }

    #[test]
    fn test_unknown_address_has_no_allocation() {
        let (mgr, _) = manager();
        let id = create(&mgr).distribution.distribution_id;
        let stranger = addr("0x00000000000000000000000000000000000000ff");

        let e = mgr.check_eligibility(id, &stranger).unwrap();
        assert_eq!(e.reason, Some(IneligibleReason::NoAllocation));
        assert!(mgr.get_proof(id, &stranger).unwrap().is_none());
    }

    #[test]
    fn test_proof_verifies_against_root() {
        let (mgr, _) = manager();
        let created = create(&mgr);
        let id = created.distribution.distribution_id;

        for a in [A, B, C] {
            let proof = mgr.get_proof(id, &addr(a)).unwrap().unwrap();
            assert_eq!(proof.root, created.root);
            assert!(crate::merkle::verify(&proof.leaf_hash, &proof.proof, &proof.root));
        }
    }

    #[test]
    fn test_list_defaults_and_clamps_page_size() {
        let (mgr, clock) = manager();
        for _ in 0..3 {
            create(&mgr);
            clock.advance(1);
        }
        let page = mgr
            .list_distributions(&DistributionFilter::default(), Some(Pagination::new(0, 10_000)))
            .unwrap();
        assert_eq!(page.limit, Config::default().distribution.max_page_size);
        let ids: Vec<_> = page.items.iter().map(|d| d.distribution_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let pending = DistributionFilter {
            status: Some(DistributionStatus::Cancelled),
            ..DistributionFilter::default()
        };
        assert_eq!(mgr.list_distributions(&pending, None).unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_cancel_pending_then_terminal() {
        let (mgr, _) = manager();
        let id = create(&mgr).distribution.distribution_id;

        let cancelled = mgr.cancel_distribution(id).await.unwrap();
        assert_eq!(cancelled.status, DistributionStatus::Cancelled);

        let err = mgr.cancel_distribution(id).await.unwrap_err();
        assert!(matches!(err, DistributorError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_record_commit_is_idempotent_and_exclusive() {
        let (mgr, _) = manager();
        let id = create(&mgr).distribution.distribution_id;
        let commit = OnchainRef {
            tx_hash: "0xaaa".to_string(),
            block_number: 7,
        };

        mgr.record_commit(id, commit.clone()).await.unwrap();
        let again = mgr.record_commit(id, commit).await.unwrap();
        assert_eq!(again.onchain_ref.unwrap().block_number, 7);

        let other = OnchainRef {
            tx_hash: "0xbbb".to_string(),
            block_number: 8,
        };
        assert!(matches!(
            mgr.record_commit(id, other).await,
            Err(DistributorError::StateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_registry_prunes_released_ids() {
        let registry = LockRegistry::default();
        let held = registry.acquire(1).await.unwrap();
        for id in 2..50 {
            drop(registry.acquire(id).await.unwrap());
        }
        assert!(registry.tracked() <= 2);

        drop(registry.acquire(99).await.unwrap());
        assert_eq!(registry.tracked(), 2);

        drop(held);
        drop(registry.acquire(100).await.unwrap());
        assert_eq!(registry.tracked(), 1);
        assert!(registry.acquire(1).await.is_ok());
    }
}
