//! Short-lived memoization of derived views
//!
//! Entries are valid while `now - created_at < ttl`. Staleness is checked
//! lazily on read; expired entries are pruned when a new value is stored.
//! There is no explicit delete.

use bokpris_core::{Clock, Isbn, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Kind of derived view held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Listed prices at every retailer.
    Purchase,
    /// Seller proceeds at the resale venues.
    Resale,
}

impl ViewKind {
    /// Legacy cache key prefix for this view.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ViewKind::Purchase => "inkop",
            ViewKind::Resale => "forsaljning",
        }
    }
}

/// Cache key: identifier plus view kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub isbn: Isbn,
    pub view: ViewKind,
}

impl CacheKey {
    pub fn new(isbn: Isbn, view: ViewKind) -> Self {
        Self { isbn, view }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.view.key_prefix(), self.isbn)
    }
}

/// Result of a cache lookup, carrying when the value was produced.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Timestamp,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// A freshly computed value.
    pub fn computed(value: T, cached_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: false,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Entries dropped because they expired.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    created_at: Timestamp,
}

/// TTL cache keyed by [`CacheKey`], safe to share between tasks.
pub struct ResultCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_valid(&self, created_at: Timestamp, now: Timestamp) -> bool {
        let age = (now - created_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    /// Cached payload for `key` if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<CacheRead<V>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let found = entries
            .get(key)
            .filter(|entry| self.is_valid(entry.created_at, now))
            .map(|entry| CacheRead::from_cache(entry.payload.clone(), entry.created_at));

        match found {
            Some(read) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(read)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `payload` under `key`, overwriting any previous entry.
    pub fn put(&self, key: CacheKey, payload: V) {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let before = entries.len();
        entries.retain(|_, entry| self.is_valid(entry.created_at, now));
        let pruned = (before - entries.len()) as u64;
        if pruned > 0 {
            self.evictions.fetch_add(pruned, Ordering::Relaxed);
        }

        entries.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
            },
        );
    }

    /// Cached payload for `key`, computing and storing it on a miss.
    ///
    /// Errors from `compute` are returned and nothing is cached.
    pub fn get_or_insert_with<E>(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<CacheRead<V>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let payload = compute()?;
        let cached_at = self.clock.now();
        tracing::debug!(key = %key, "Cache miss, storing recomputed view");
        self.put(key, payload.clone());
        Ok(CacheRead::computed(payload, cached_at))
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self
            .entries
            .read()
            .map(|e| e.len() as u64)
            .unwrap_or_else(|e| e.into_inner().len() as u64);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
