use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

/// Default capacity bound for [`ResultCache`].
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Percentage in `[0, 100]`; `0` when no request has been served yet.
    pub hit_rate: f64,
}

struct CacheEntry {
    value: HashMap<String, Value>,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.created_at + self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    lru_order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        self.lru_order.retain(|k| k != key);
        self.lru_order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.lru_order.retain(|k| k != key);
    }

    fn pop_lru(&mut self) -> Option<String> {
        let key = self.lru_order.pop_front()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Bounded TTL + LRU store for node invocation results.
///
/// Shared by every in-flight node task in a level; all mutation happens
/// under one mutex.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

impl ResultCache {
    pub fn new(max_size: usize) -> Self {
        ResultCache {
            inner: Mutex::new(CacheInner::default()),
            max_size: max_size.max(1),
        }
    }

    /// Look up a fingerprint. Expired entries are evicted and counted as a
    /// miss; a hit refreshes recency and bumps the entry's access count.
    pub fn get(&self, key: &str) -> Option<HashMap<String, Value>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            inner.remove(key);
            inner.evictions += 1;
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        inner.touch(key);
        let entry = inner
            .entries
            .get_mut(key)
            .expect("entry checked present above");
        entry.last_accessed = now;
        entry.access_count += 1;
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry. When the store is full and the key is
    /// new, the least-recently-used entry is evicted first.
    pub fn set(&self, key: &str, value: HashMap<String, Value>, ttl: Duration) {
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_size {
            if let Some(evicted) = inner.pop_lru() {
                inner.evictions += 1;
                tracing::debug!(key = %evicted, "cache full, evicted least-recently-used entry");
            }
        }

        let now = Instant::now();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
                last_accessed: now,
                access_count: 0,
            },
        );
        inner.touch(key);
    }

    /// Sweep out every expired entry; returns how many were removed.
    /// Invoked by an external maintenance trigger, never scheduled here.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
            inner.evictions += 1;
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64 * 100.0
            },
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru_order.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::new(DEFAULT_MAX_SIZE)
    }
}
