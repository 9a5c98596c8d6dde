use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::search::tokenization::normalize_query;

/// Key prefix for classification lookups.
pub const SEARCH_PREFIX: &str = "search";
/// Ancillary prefix used by callers that cache derived views (top-N,
/// explanations) of the same queries.
pub const CLASSIFY_PREFIX: &str = "classify";

const DEFAULT_CAPACITY: usize = 10_000;

/// Generate a deterministic hash key for a query
/// Uses ahash with a fixed seed for consistent, fast cache keys across program runs
pub fn cache_key(prefix: &str, query: &str, engine: &str, params: &[(&str, &str)]) -> String {
    use ahash::RandomState;

    let build_hasher = RandomState::with_seeds(
        0x123456789abcdef,
        0xfedcba9876543210,
        0x1111111111111111,
        0x2222222222222222,
    );

    let mut material = normalize_query(query);
    material.push('\u{1f}');
    material.push_str(engine);
    for (name, value) in params {
        material.push('\u{1f}');
        material.push_str(name);
        material.push('=');
        material.push_str(value);
    }

    format!("{prefix}:{:016x}", build_hasher.hash_one(&material))
}

/// A cached classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrediction {
    pub doc_path: String,
    pub confidence: f64,
}

struct Entry {
    value: CachedPrediction,
    expires_at: Instant,
}

/// Hit/miss counters for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

/// TTL-bounded hot-query cache.
///
/// Keys are `<prefix>:<16-hex>` strings derived from the normalized
/// query, the engine identifier and any extra parameters. The cache is
/// safe for concurrent use and degrades to a no-op when disabled or when
/// its backing state is unavailable; callers never see a cache failure,
/// only a miss.
pub struct QueryCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(enabled: bool, ttl_seconds: u64) -> Self {
        Self {
            enabled,
            ttl: Duration::from_secs(ttl_seconds),
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CAPACITY).unwrap(),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a previous prediction. Expired entries count as misses
    /// and are evicted on the way out.
    pub fn get(&self, prefix: &str, query: &str, engine: &str) -> Option<CachedPrediction> {
        if !self.enabled {
            return None;
        }

        let key = cache_key(prefix, query, engine, &[]);

        // A poisoned lock means the backing state is unusable; treat it
        // as an unavailable store and report a miss.
        let Ok(mut entries) = self.entries.lock() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, prefix: &str, query: &str, engine: &str, value: CachedPrediction) {
        if !self.enabled {
            return;
        }

        let key = cache_key(prefix, query, engine, &[]);
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop the entry for one query, e.g. after the answer for that
    /// query was corrected.
    pub fn remove(&self, prefix: &str, query: &str, engine: &str) {
        if !self.enabled {
            return;
        }

        let key = cache_key(prefix, query, engine, &[]);
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(&key);
        }
    }

    /// Invalidate every entry under the search prefixes. Called whenever
    /// the corpus changes, since any cached answer may now be stale.
    pub fn invalidate_on_doc_change(&self) {
        if !self.enabled {
            return;
        }

        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let stale: Vec<String> = entries
            .iter()
            .filter(|(key, _)| {
                key.starts_with(SEARCH_PREFIX) || key.starts_with(CLASSIFY_PREFIX)
            })
            .map(|(key, _)| key.clone())
            .collect();
        let count = stale.len();
        for key in stale {
            entries.pop(&key);
        }
        debug!(count, "invalidated cached queries after corpus change");
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            enabled: self.enabled,
            hits,
            misses,
            total_requests: total,
            hit_rate: if total > 0 {
                (hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(doc: &str) -> CachedPrediction {
        CachedPrediction {
            doc_path: doc.to_string(),
            confidence: 87.5,
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let cache = QueryCache::new(true, 3600);
        cache.set(SEARCH_PREFIX, "schema failed", "hybrid", prediction("a.md"));

        let hit = cache.get(SEARCH_PREFIX, "schema failed", "hybrid").unwrap();
        assert_eq!(hit.doc_path, "a.md");
    }

    #[test]
    fn test_key_normalizes_query() {
        let cache = QueryCache::new(true, 3600);
        cache.set(SEARCH_PREFIX, "Schema   FAILED", "hybrid", prediction("a.md"));
        assert!(cache.get(SEARCH_PREFIX, "schema failed", "hybrid").is_some());
    }

    #[test]
    fn test_engine_separates_keys() {
        let cache = QueryCache::new(true, 3600);
        cache.set(SEARCH_PREFIX, "q", "hybrid", prediction("a.md"));
        assert!(cache.get(SEARCH_PREFIX, "q", "other").is_none());
    }

    #[test]
    fn test_disabled_cache_is_noop() {
        let cache = QueryCache::new(false, 3600);
        cache.set(SEARCH_PREFIX, "q", "hybrid", prediction("a.md"));
        assert!(cache.get(SEARCH_PREFIX, "q", "hybrid").is_none());
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = QueryCache::new(true, 0);
        cache.set(SEARCH_PREFIX, "q", "hybrid", prediction("a.md"));
        assert!(cache.get(SEARCH_PREFIX, "q", "hybrid").is_none());
    }

    #[test]
    fn test_invalidate_on_doc_change() {
        let cache = QueryCache::new(true, 3600);
        cache.set(SEARCH_PREFIX, "q1", "hybrid", prediction("a.md"));
        cache.set(CLASSIFY_PREFIX, "q2", "hybrid", prediction("b.md"));
        cache.invalidate_on_doc_change();
        assert!(cache.get(SEARCH_PREFIX, "q1", "hybrid").is_none());
        assert!(cache.get(CLASSIFY_PREFIX, "q2", "hybrid").is_none());
    }

    #[test]
    fn test_remove_single_query() {
        let cache = QueryCache::new(true, 3600);
        cache.set(SEARCH_PREFIX, "q1", "hybrid", prediction("a.md"));
        cache.set(SEARCH_PREFIX, "q2", "hybrid", prediction("b.md"));
        cache.remove(SEARCH_PREFIX, "q1", "hybrid");
        assert!(cache.get(SEARCH_PREFIX, "q1", "hybrid").is_none());
        assert!(cache.get(SEARCH_PREFIX, "q2", "hybrid").is_some());
    }

    #[test]
    fn test_hit_miss_counters() {
        let cache = QueryCache::new(true, 3600);
        cache.get(SEARCH_PREFIX, "q", "hybrid");
        cache.set(SEARCH_PREFIX, "q", "hybrid", prediction("a.md"));
        cache.get(SEARCH_PREFIX, "q", "hybrid");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }
}
