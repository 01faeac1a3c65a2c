//! TTL cache with an injected clock.
//!
//! Staleness is decided by comparing `fetched_at` against the clock, never by
//! timers, so expiry can be tested by moving a [`crate::clock::ManualClock`].

use crate::clock::Clock;
use crate::types::Timestamp;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Timestamp,
}

impl<V> CacheEntry<V> {
    #[must_use]
    pub fn is_fresh(&self, now: Timestamp, ttl_secs: u64) -> bool {
        now.saturating_sub(self.fetched_at) < ttl_secs
    }
}

pub struct TtlCache<K, V, C> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl_secs: u64,
    clock: C,
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash,
    V: Clone,
    C: Clock,
{
    pub fn new(ttl_secs: u64, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_secs,
            clock,
        }
    }

    /// Returns the cached value if it is younger than the TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl_secs))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            fetched_at: self.clock.now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(100));
        let cache: TtlCache<u64, &str, _> = TtlCache::new(10, clock.clone());

        cache.insert(1, "root");
        assert_eq!(cache.get(&1), Some("root"));

        clock.advance(9);
        assert_eq!(cache.get(&1), Some("root"));

        clock.advance(1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn test_zero_ttl_never_serves() {
        let cache: TtlCache<u64, u64, _> = TtlCache::new(0, ManualClock::new(0));
        cache.insert(1, 1);
        assert_eq!(cache.get(&1), None);
    }
}
