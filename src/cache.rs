use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// TTL-keyed result cache with hit/miss accounting.
///
/// Keys are the canonical serialization of the full query parameter set;
/// two semantically equivalent queries serialized differently are distinct
/// entries. Staleness is checked on read; there is no other eviction and
/// size is reported but not bounded.
pub struct ResponseCache<V> {
    entries: Arc<DashMap<String, (V, Instant)>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            hits: Arc::clone(&self.hits),
            misses: Arc::clone(&self.misses),
        }
    }
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value iff its age is still below `ttl`; a stale entry is
    /// dropped and counts as a miss.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let fresh = match self.entries.get(key) {
            Some(entry) if entry.1.elapsed() < ttl => Some(entry.0.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` with a fresh timestamp, overwriting any
    /// prior entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (value, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fraction of reads served from cache; 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}
