//! Persistence boundary for distributions and their leaves.
//!
//! The engine only needs id assignment, whole-record reads, indexed leaf lookup
//! by `(distribution_id, address)`, filtered listing, and an atomic replace.
//! [`MemoryStore`] is the in-process implementation; a database-backed store
//! implements the same trait.

use crate::error::{DistributorError, Result};
use crate::ethereum::Address;
use crate::types::{Distribution, DistributionFilter, DistributionId, Leaf, Page, Pagination};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub trait DistributionStore: Send + Sync {
    /// Reserves a fresh, never reused distribution id.
    fn next_id(&self) -> Result<DistributionId>;

    /// Persists a new distribution together with all of its leaves.
    fn insert(&self, distribution: Distribution, leaves: Vec<Leaf>) -> Result<()>;

    fn get(&self, id: DistributionId) -> Result<Option<Distribution>>;

    /// Distribution and leaves read under one lock, so the pair is consistent.
    fn snapshot(&self, id: DistributionId) -> Result<Option<(Distribution, Vec<Leaf>)>>;

    /// Distribution plus the address's leaf (if any), read under one lock.
    fn lookup(
        &self,
        id: DistributionId,
        address: &Address,
    ) -> Result<Option<(Distribution, Option<Leaf>)>>;

    /// Leaves ordered by index.
    fn leaves(&self, id: DistributionId, page: Pagination) -> Result<Option<Page<Leaf>>>;

    /// Newest first; ties broken by descending id.
    fn list(&self, filter: &DistributionFilter, page: Pagination) -> Result<Page<Distribution>>;

    /// Atomically replaces the distribution record and, when given, its leaf set.
    ///
    /// A replacement leaf set must keep the same indices, addresses, amounts and hashes.
    fn replace(&self, distribution: Distribution, leaves: Option<Vec<Leaf>>) -> Result<()>;
}

struct Record {
    distribution: Distribution,
    leaves: Vec<Leaf>,
    by_address: HashMap<Address, usize>,
}

#[derive(Default)]
struct Inner {
    last_id: DistributionId,
    records: HashMap<DistributionId, Record>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| DistributorError::Storage("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| DistributorError::Storage("store lock poisoned".to_string()))
    }
}

fn paginate<T: Clone>(items: &[T], page: Pagination) -> Page<T> {
    Page {
        items: items.iter().skip(page.offset).take(page.limit).cloned().collect(),
        total: items.len(),
        offset: page.offset,
        limit: page.limit,
    }
}

fn same_leaf_identity(a: &Leaf, b: &Leaf) -> bool {
    a.index == b.index && a.address == b.address && a.amount == b.amount && a.leaf_hash == b.leaf_hash
}

impl DistributionStore for MemoryStore {
    fn next_id(&self) -> Result<DistributionId> {
        let mut inner = self.write()?;
        inner.last_id += 1;
        Ok(inner.last_id)
    }

    fn insert(&self, distribution: Distribution, leaves: Vec<Leaf>) -> Result<()> {
        let id = distribution.distribution_id;
        let mut inner = self.write()?;
        if inner.records.contains_key(&id) {
            return Err(DistributorError::Storage(format!(
                "distribution {id} already exists"
            )));
        }

        let by_address = leaves
            .iter()
            .enumerate()
            .map(|(pos, leaf)| (leaf.address, pos))
            .collect();
        inner.last_id = inner.last_id.max(id);
        inner.records.insert(
            id,
            Record {
                distribution,
                leaves,
                by_address,
            },
        );
        Ok(())
    }

    fn get(&self, id: DistributionId) -> Result<Option<Distribution>> {
        Ok(self.read()?.records.get(&id).map(|r| r.distribution.clone()))
    }

    fn snapshot(&self, id: DistributionId) -> Result<Option<(Distribution, Vec<Leaf>)>> {
        Ok(self
            .read()?
            .records
            .get(&id)
            .map(|r| (r.distribution.clone(), r.leaves.clone())))
    }

    fn lookup(
        &self,
        id: DistributionId,
        address: &Address,
    ) -> Result<Option<(Distribution, Option<Leaf>)>> {
        let inner = self.read()?;
        Ok(inner.records.get(&id).map(|record| {
            let leaf = record
                .by_address
                .get(address)
                .and_then(|&pos| record.leaves.get(pos))
                .cloned();
            (record.distribution.clone(), leaf)
        }))
    }

    fn leaves(&self, id: DistributionId, page: Pagination) -> Result<Option<Page<Leaf>>> {
        Ok(self
            .read()?
            .records
            .get(&id)
            .map(|r| paginate(&r.leaves, page)))
    }

    fn list(&self, filter: &DistributionFilter, page: Pagination) -> Result<Page<Distribution>> {
        let inner = self.read()?;
        let mut matching: Vec<&Distribution> = inner
            .records
            .values()
            .map(|r| &r.distribution)
            .filter(|d| filter.matches(d))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.distribution_id.cmp(&a.distribution_id))
        });
        let owned: Vec<Distribution> = matching.into_iter().cloned().collect();
        Ok(paginate(&owned, page))
    }

    fn replace(&self, distribution: Distribution, leaves: Option<Vec<Leaf>>) -> Result<()> {
        let id = distribution.distribution_id;
        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(DistributorError::DistributionNotFound(id))?;

        if record.distribution.merkle_root != distribution.merkle_root {
            return Err(DistributorError::integrity(id, "merkle root is immutable"));
        }
        if let Some(leaves) = &leaves {
            let unchanged = leaves.len() == record.leaves.len()
                && leaves
                    .iter()
                    .zip(&record.leaves)
                    .all(|(new, old)| same_leaf_identity(new, old));
            if !unchanged {
                return Err(DistributorError::integrity(
                    id,
                    "replacement leaf set alters immutable leaf fields",
                ));
            }
        }

        record.distribution = distribution;
        if let Some(leaves) = leaves {
            record.leaves = leaves;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::LeafEncoding;
    use crate::types::{DistributionStatus, VaultType};
    use std::collections::BTreeMap;

    fn distribution(id: DistributionId, created_at: u64, vault_type: VaultType) -> Distribution {
        Distribution {
            distribution_id: id,
            merkle_root: [id as u8; 32],
            leaf_encoding: LeafEncoding::V1,
            vault_type,
            total_amount: 10,
            total_recipients: 1,
            claimed_count: 0,
            claimed_amount: 0,
            start_time: created_at,
            end_time: created_at + 100,
            status: DistributionStatus::Pending,
            onchain_ref: None,
            created_at,
            metadata: BTreeMap::new(),
        }
    }

    fn leaf(index: u64, byte: u8) -> Leaf {
        Leaf {
            index,
            address: Address::from_bytes([byte; 20]),
            amount: 10,
            leaf_hash: [byte; 32],
            claimed: false,
            claimed_at: None,
            claim_tx_ref: None,
        }
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let store = MemoryStore::new();
        let a = store.next_id().unwrap();
        let b = store.next_id().unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let store = MemoryStore::new();
        store.insert(distribution(1, 0, VaultType::Treasury), vec![]).unwrap();
        assert!(store.insert(distribution(1, 0, VaultType::Treasury), vec![]).is_err());
    }

    #[test]
    fn test_leaf_lookup_by_address() {
        let store = MemoryStore::new();
        store
            .insert(distribution(1, 0, VaultType::Treasury), vec![leaf(0, 1), leaf(1, 2)])
            .unwrap();
        let (_, found) = store.lookup(1, &Address::from_bytes([2; 20])).unwrap().unwrap();
        assert_eq!(found.unwrap().index, 1);
        let (_, missing) = store.lookup(1, &Address::from_bytes([3; 20])).unwrap().unwrap();
        assert!(missing.is_none());
        assert!(store.lookup(9, &Address::from_bytes([2; 20])).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_and_orders_newest_first() {
        let store = MemoryStore::new();
        store.insert(distribution(1, 100, VaultType::Treasury), vec![]).unwrap();
        store.insert(distribution(2, 300, VaultType::Staking), vec![]).unwrap();
        store.insert(distribution(3, 200, VaultType::Treasury), vec![]).unwrap();

        let all = store.list(&DistributionFilter::default(), Pagination::new(0, 10)).unwrap();
        let ids: Vec<_> = all.items.iter().map(|d| d.distribution_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let filter = DistributionFilter {
            vault_type: Some(VaultType::Treasury),
            ..DistributionFilter::default()
        };
        let treasury = store.list(&filter, Pagination::new(1, 10)).unwrap();
        assert_eq!(treasury.total, 2);
        assert_eq!(treasury.items.len(), 1);
        assert_eq!(treasury.items[0].distribution_id, 1);
    }

    #[test]
    fn test_replace_refuses_to_alter_leaf_identity() {
        let store = MemoryStore::new();
        store
            .insert(distribution(1, 0, VaultType::Treasury), vec![leaf(0, 1)])
            .unwrap();

        let mut tampered = leaf(0, 1);
        tampered.amount = 11;
        let err = store
            .replace(distribution(1, 0, VaultType::Treasury), Some(vec![tampered]))
            .unwrap_err();
        assert!(matches!(err, DistributorError::Integrity { .. }));

        let mut claimed = leaf(0, 1);
        claimed.claimed = true;
        store
            .replace(distribution(1, 0, VaultType::Treasury), Some(vec![claimed]))
            .unwrap();
        let (_, leaves) = store.snapshot(1).unwrap().unwrap();
        assert!(leaves[0].claimed);
    }
}
