//! In-process TTL caches
//!
//! Explicit cache objects constructed once at startup and injected into
//! their dependents; there are no module-level cache globals. Entries carry
//! their own deadline and expire lazily on read, with an explicit
//! `purge_expired` for housekeeping.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default cap on cache entries before eviction kicks in
const DEFAULT_MAX_ENTRIES: usize = 1000;

struct CachedValue<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent TTL cache
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: DashMap<K, CachedValue<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Fetch a live value; expired entries are dropped on the way out.
    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        if hit.is_none() {
            self.entries.remove_if(key, |_, v| v.expires_at <= Instant::now());
        }

        hit
    }

    /// Insert with the cache's TTL.
    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.max_entries {
            self.evict();
        }

        self.entries.insert(
            key,
            CachedValue {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop one key immediately (explicit refresh point).
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, v| v.expires_at > now);
        before - self.entries.len()
    }

    /// Expired entries first; if still over capacity, clear half.
    fn evict(&self) {
        self.purge_expired();

        if self.entries.len() >= self.max_entries {
            let to_remove: Vec<K> = self
                .entries
                .iter()
                .take(self.entries.len() / 2)
                .map(|entry| entry.key().clone())
                .collect();
            let removed = to_remove.len();
            for key in to_remove {
                self.entries.remove(&key);
            }
            debug!(removed, "Cache over capacity, evicted entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_expire() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(20));
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a".to_string()), None);
        // Lazy removal dropped the entry
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".into(), 1);
        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_eviction() {
        let cache: TtlCache<u32, u32> = TtlCache::with_capacity(Duration::from_secs(60), 4);
        for i in 0..8 {
            cache.insert(i, i);
        }
        assert!(cache.len() <= 5);
    }
}
