// src/analyzer/cache.rs
// =============================================================================
// Time-limited result cache.
//
// Analyzing a page is expensive (one fetch plus a probe per link), and the
// same page tends to be submitted several times in a row. Successful results
// are kept for a fixed TTL, keyed by the normalized URL.
//
// Backed by moka, which handles expiry and a size bound on its own: entries
// older than the TTL are never returned, and once `max_capacity` is reached
// the least useful entries are evicted.
// =============================================================================

use std::time::Duration;

use moka::sync::Cache;

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            ttl,
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    /// Approximate number of live entries
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Applies pending evictions now instead of on moka's own schedule
    pub fn sync(&self) {
        self.entries.run_pending_tasks();
    }
}
