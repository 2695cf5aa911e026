//! Cache statistics snapshot.

use std::fmt;

/// Point-in-time view of cache occupancy and counters.
///
/// Taken under the cache lock, so `entries` and `total_size` are mutually
/// consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resident objects.
    pub entries: usize,
    /// Sum of resident payload sizes in bytes.
    pub total_size: usize,
    /// Configured capacity in bytes.
    pub capacity: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Successful inserts.
    pub insertions: u64,
    /// Entries removed to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, or 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {}/{} bytes, {} hits, {} misses, {} evictions",
            self.entries, self.total_size, self.capacity, self.hits, self.misses, self.evictions
        )
    }
}
