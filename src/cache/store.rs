//! Bounded LRU object store.
//!
//! # Responsibilities
//! - Map raw request-URI bytes to an immutable response payload
//! - Keep `total_size <= capacity` after every public operation
//! - Promote entries on hit, evict least-recently-used on insert
//! - Serialize all access behind a single mutex

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::CacheStats;
use crate::observability::metrics;

/// A resident cached object.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Bytes,
}

impl CacheEntry {
    fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Result of an [`ObjectCache::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The payload is now resident; `evicted` older entries were dropped for it.
    Inserted { evicted: usize },
    /// An entry with this key already existed and was left untouched.
    AlreadyPresent,
    /// The payload is larger than the whole cache and was rejected.
    TooLarge,
}

/// State guarded by the cache mutex.
#[derive(Debug)]
struct CacheInner {
    /// Most-recently-used at the front, least-recently-used at the back.
    lru: LruCache<Bytes, CacheEntry>,
    total_size: usize,
    hits: u64,
    misses: u64,
    insertions: u64,
    evictions: u64,
}

/// Thread-safe, byte-bounded LRU cache of response payloads.
///
/// Shared between sessions behind an `Arc`. Every method takes the one lock for
/// its whole duration, so a lookup racing an insert-with-eviction always sees
/// a recency list and byte total that agree.
#[derive(Debug)]
pub struct ObjectCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ObjectCache {
    /// Create an empty cache holding at most `capacity` payload bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::unbounded(),
                total_size: 0,
                hits: 0,
                misses: 0,
                insertions: 0,
                evictions: 0,
            }),
            capacity,
        }
    }

    /// Return a copy of the payload cached under `key`, promoting it to
    /// most-recently-used. A miss changes nothing but the miss counter.
    pub fn lookup(&self, key: impl AsRef<[u8]>) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let found = inner.lru.get(key.as_ref()).map(|entry| entry.payload.clone());
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        metrics::record_cache_lookup(found.is_some());
        found
    }

    /// Insert `payload` under `key` unless the key is already resident.
    ///
    /// Least-recently-used entries are evicted one at a time until the new
    /// payload fits. A payload larger than the capacity is rejected before
    /// anything is evicted.
    /// Keys are compared byte for byte; no normalization is applied.
    pub fn insert(&self, key: impl Into<Bytes>, payload: Bytes) -> InsertOutcome {
        let key = key.into();
        let size = payload.len();

        let mut inner = self.inner.lock();
        if inner.lru.contains(&key) {
            return InsertOutcome::AlreadyPresent;
        }
        if size > self.capacity {
            tracing::debug!(uri = ?key, bytes = size, capacity = self.capacity, "Object larger than cache, not inserted");
            return InsertOutcome::TooLarge;
        }

        let mut evicted = 0;
        while inner.total_size + size > self.capacity {
            let Some((old_key, old)) = inner.lru.pop_lru() else {
                break;
            };
            inner.total_size -= old.size();
            evicted += 1;
            tracing::trace!(uri = ?old_key, bytes = old.size(), "Evicted cache entry");
        }

        inner.lru.put(key, CacheEntry { payload });
        inner.total_size += size;
        inner.insertions += 1;
        inner.evictions += evicted as u64;

        metrics::record_cache_evictions(evicted);
        metrics::record_cache_size(inner.total_size, inner.lru.len());

        InsertOutcome::Inserted { evicted }
    }

    /// Whether `key` is resident. Does not affect recency.
    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.inner.lock().lru.contains(key.as_ref())
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of resident payload sizes in bytes.
    pub fn total_size(&self) -> usize {
        self.inner.lock().total_size
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resident keys, most-recently-used first.
    pub fn keys_by_recency(&self) -> Vec<Bytes> {
        self.inner
            .lock()
            .lru
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot of occupancy and counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.lru.len(),
            total_size: inner.total_size,
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            insertions: inner.insertions,
            evictions: inner.evictions,
        }
    }
}
