//! Time-windowed cache for upstream lookups.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(30_000);

/// Build a deterministic cache key from an operation name and its parameters.
/// Parameters are serialized in the order given.
pub fn cache_key(operation: &str, params: &[&dyn Display]) -> String {
    let mut key = operation.to_string();
    for p in params {
        key.push(':');
        key.push_str(&p.to_string());
    }
    key
}

/// Cached payload with its creation time.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub created_at: Instant,
}

/// Snapshot of cache hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: usize,
    pub misses: usize,
}

/// Unbounded TTL cache. Expired entries are ignored by `get` and linger
/// until overwritten or cleared.
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    pub ttl: Duration,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Get a cached payload if present and younger than the TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite an entry, stamped with the current time.
    pub fn put(&mut self, key: impl Into<String>, payload: V) {
        self.entries.insert(key.into(), CacheEntry { payload, created_at: Instant::now() });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retrieve current cache metrics snapshot.
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
