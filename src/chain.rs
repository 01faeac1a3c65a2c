//! Chain boundary: the read-only view reconciliation pulls truth from.
//!
//! Raw contract events enter through [`decode_event`], which validates their
//! shape into a typed [`ChainEvent`] before anything else sees them.
//! [`ChainLedger`] replays those events into per-distribution state and
//! [`InMemoryChain`] serves that state through [`ChainReader`].

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::{DistributorError, Result};
use crate::ethereum::Address;
use crate::types::{serde_amount, serde_hash, Amount, DistributionId, Hash, Timestamp, TimingWindow};
use crate::utils::hash_to_hex;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Evidence that one leaf was claimed on-chain.
///
/// Bitmap reads only know the index; event replays also carry the claimant,
/// amount, transaction and block time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub account: Option<Address>,
    pub amount: Option<Amount>,
    pub tx_ref: Option<String>,
    pub claimed_at: Option<Timestamp>,
}

/// Claimed leaf indices with whatever evidence the chain exposes.
pub type ClaimedSet = BTreeMap<u64, ClaimRecord>;

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Root committed for the distribution, `None` if not committed yet.
    async fn get_root(&self, id: DistributionId) -> Result<Option<Hash>>;

    /// Every claimed index for the distribution.
    async fn get_claimed_flags(&self, id: DistributionId, leaf_count: u64) -> Result<ClaimedSet>;

    async fn get_timing_window(&self, id: DistributionId) -> Result<Option<TimingWindow>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootCommitted {
    pub distribution_id: DistributionId,
    #[serde(with = "serde_hash")]
    pub merkle_root: Hash,
    pub leaf_count: u64,
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingSet {
    pub distribution_id: DistributionId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claimed {
    pub distribution_id: DistributionId,
    pub index: u64,
    pub account: Address,
    #[serde(with = "serde_amount")]
    pub amount: Amount,
    pub tx_hash: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    RootCommitted(RootCommitted),
    TimingSet(TimingSet),
    Claimed(Claimed),
}

impl ChainEvent {
    #[must_use]
    pub fn distribution_id(&self) -> DistributionId {
        match self {
            ChainEvent::RootCommitted(e) => e.distribution_id,
            ChainEvent::TimingSet(e) => e.distribution_id,
            ChainEvent::Claimed(e) => e.distribution_id,
        }
    }
}

/// Decodes one raw event, failing on unknown tags, missing or extra fields.
pub fn decode_event(raw: &serde_json::Value) -> Result<ChainEvent> {
    ChainEvent::deserialize(raw)
        .map_err(|e| DistributorError::Encoding(format!("unexpected chain event shape: {e}")))
}

/// Decodes newline-delimited JSON events; blank lines are skipped.
pub fn decode_event_log(log: &str) -> Result<Vec<ChainEvent>> {
    log.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                DistributorError::Encoding(format!("event log line {}: {e}", n + 1))
            })?;
            decode_event(&value)
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
struct LedgerEntry {
    root: Option<Hash>,
    leaf_count: u64,
    window: Option<TimingWindow>,
    claims: ClaimedSet,
}

/// On-chain state rebuilt by replaying events in order.
#[derive(Debug, Clone, Default)]
pub struct ChainLedger {
    entries: HashMap<DistributionId, LedgerEntry>,
}

impl ChainLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event with the contract's own rules: the root and the timing
    /// window are each set once, claims need a committed root, an in-range
    /// index and no prior claim.
    pub fn apply(&mut self, event: &ChainEvent) -> Result<()> {
        let id = event.distribution_id();
        let entry = self.entries.entry(id).or_default();

        match event {
            ChainEvent::RootCommitted(e) => {
                if let Some(existing) = entry.root {
                    if existing != e.merkle_root {
                        return Err(DistributorError::integrity(
                            id,
                            format!(
                                "root already committed as {}, got {}",
                                hash_to_hex(&existing),
                                hash_to_hex(&e.merkle_root)
                            ),
                        ));
                    }
                }
                entry.root = Some(e.merkle_root);
                entry.leaf_count = e.leaf_count;
            }
            ChainEvent::TimingSet(e) => {
                if e.end_time <= e.start_time {
                    return Err(DistributorError::Encoding(format!(
                        "timing window for distribution {id} ends before it starts"
                    )));
                }
                let window = TimingWindow {
                    start_time: e.start_time,
                    end_time: e.end_time,
                };
                if let Some(existing) = entry.window {
                    if existing != window {
                        return Err(DistributorError::integrity(
                            id,
                            format!(
                                "timing window already set to [{}, {}), got [{}, {})",
                                existing.start_time, existing.end_time, window.start_time, window.end_time
                            ),
                        ));
                    }
                }
                entry.window = Some(window);
            }
            ChainEvent::Claimed(e) => {
                if entry.root.is_none() {
                    return Err(DistributorError::integrity(id, "claim before root commit"));
                }
                if e.index >= entry.leaf_count {
                    return Err(DistributorError::integrity(
                        id,
                        format!("claim index {} out of range {}", e.index, entry.leaf_count),
                    ));
                }
                if entry.claims.contains_key(&e.index) {
                    return Err(DistributorError::integrity(
                        id,
                        format!("index {} claimed twice", e.index),
                    ));
                }
                entry.claims.insert(
                    e.index,
                    ClaimRecord {
                        account: Some(e.account),
                        amount: Some(e.amount),
                        tx_ref: Some(e.tx_hash.clone()),
                        claimed_at: Some(e.timestamp),
                    },
                );
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn root(&self, id: DistributionId) -> Option<Hash> {
        self.entries.get(&id).and_then(|e| e.root)
    }

    #[must_use]
    pub fn window(&self, id: DistributionId) -> Option<TimingWindow> {
        self.entries.get(&id).and_then(|e| e.window)
    }

    #[must_use]
    pub fn claims(&self, id: DistributionId) -> ClaimedSet {
        self.entries
            .get(&id)
            .map(|e| e.claims.clone())
            .unwrap_or_default()
    }
}

/// Which reads an [`InMemoryChain`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outage {
    #[default]
    None,
    All,
    /// Root and timing succeed, claim reads fail: a mid-sync failure.
    ClaimsOnly,
}

/// [`ChainReader`] over a local [`ChainLedger`].
#[derive(Default)]
pub struct InMemoryChain {
    ledger: Mutex<ChainLedger>,
    outage: Mutex<Outage>,
    reads: AtomicUsize,
}

impl InMemoryChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: ChainEvent) -> Result<()> {
        debug!("Applying chain event to distribution {}", event.distribution_id());
        self.ledger
            .lock()
            .map_err(|_| DistributorError::Storage("chain ledger lock poisoned".to_string()))?
            .apply(&event)
    }

    pub fn set_outage(&self, outage: Outage) {
        if let Ok(mut current) = self.outage.lock() {
            *current = outage;
        }
    }

    /// Number of reads served, for observing caching.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn begin_read(&self, id: DistributionId, claims: bool) -> Result<std::sync::MutexGuard<'_, ChainLedger>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let outage = self.outage.lock().map(|o| *o).unwrap_or(Outage::All);
        let down = match outage {
            Outage::None => false,
            Outage::All => true,
            Outage::ClaimsOnly => claims,
        };
        if down {
            warn!("Simulated chain outage while reading distribution {id}");
            return Err(DistributorError::upstream(id, "chain endpoint unreachable"));
        }
        self.ledger
            .lock()
            .map_err(|_| DistributorError::upstream(id, "chain ledger lock poisoned"))
    }
}

#[async_trait]
impl ChainReader for InMemoryChain {
    async fn get_root(&self, id: DistributionId) -> Result<Option<Hash>> {
        Ok(self.begin_read(id, false)?.root(id))
    }

    async fn get_claimed_flags(&self, id: DistributionId, _leaf_count: u64) -> Result<ClaimedSet> {
        Ok(self.begin_read(id, true)?.claims(id))
    }

    async fn get_timing_window(&self, id: DistributionId) -> Result<Option<TimingWindow>> {
        Ok(self.begin_read(id, false)?.window(id))
    }
}

/// Caches committed roots and timing windows, which never change once set.
///
/// Absent values are not cached, so a commit becomes visible on the next read.
/// Claim flags always go to the inner reader.
pub struct CachedChainReader<R, C> {
    inner: R,
    roots: TtlCache<DistributionId, Hash, C>,
    windows: TtlCache<DistributionId, TimingWindow, C>,
}

impl<R, C> CachedChainReader<R, C>
where
    R: ChainReader,
    C: Clock + Clone,
{
    pub fn new(inner: R, ttl_secs: u64, clock: C) -> Self {
        Self {
            inner,
            roots: TtlCache::new(ttl_secs, clock.clone()),
            windows: TtlCache::new(ttl_secs, clock),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R, C> ChainReader for CachedChainReader<R, C>
where
    R: ChainReader,
    C: Clock + Clone,
{
    async fn get_root(&self, id: DistributionId) -> Result<Option<Hash>> {
        if let Some(root) = self.roots.get(&id) {
            return Ok(Some(root));
        }
        let root = self.inner.get_root(id).await?;
        if let Some(root) = root {
            self.roots.insert(id, root);
        }
        Ok(root)
    }

    async fn get_claimed_flags(&self, id: DistributionId, leaf_count: u64) -> Result<ClaimedSet> {
        self.inner.get_claimed_flags(id, leaf_count).await
    }

    async fn get_timing_window(&self, id: DistributionId) -> Result<Option<TimingWindow>> {
        if let Some(window) = self.windows.get(&id) {
            return Ok(Some(window));
        }
        let window = self.inner.get_timing_window(id).await?;
        if let Some(window) = window {
            self.windows.insert(id, window);
        }
        Ok(window)
    }
}
