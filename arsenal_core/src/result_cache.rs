//! TTL + capacity-bound LRU cache of command results.
//!
//! Repeated invocations of the same tool with the same parameters are common
//! when an agent retries or several callers probe the same target, and the
//! underlying commands are expensive. The cache keys on the command plus a
//! canonicalized parameter map, so semantically identical calls collide no
//! matter how the parameter map was built.
//!
//! Expiry is lazy: an expired entry is deleted on `get` and counted as a
//! miss. Capacity pressure evicts the least-recently-used entry, and a
//! successful `get` refreshes recency.

use crate::constants::CACHE_FOOTPRINT_FALLBACK_BYTES;
use crate::executor::ExecutionResult;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// Cache performance counters, shaped for the observability endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hit fraction in [0, 1] over all lookups so far.
    pub hit_rate: f64,
    /// Estimated in-memory footprint of the cached payloads.
    pub approx_memory_bytes: u64,
}

#[derive(Debug)]
struct CacheEntry {
    stored_at: Instant,
    ttl: Duration,
    payload: ExecutionResult,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Capacity- and TTL-bound result cache.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResultCache")
            .field("size", &inner.entries.len())
            .field("max_size", &self.max_size)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Create a cache holding up to `max_size` entries, each valid for
    /// `ttl`. A zero capacity is clamped to one entry.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            max_size: capacity.get(),
            ttl,
        }
    }

    /// Canonical cache key: command plus the parameter map serialized with
    /// sorted keys, so construction order cannot split identical calls.
    fn key(command: &str, params: &Map<String, Value>) -> String {
        let canonical: BTreeMap<&String, &Value> = params.iter().collect();
        let params_json = serde_json::to_string(&canonical).unwrap_or_default();
        format!("{command}:{params_json}")
    }

    /// Look up a previous result. Expired entries are deleted here and
    /// reported as misses; a hit refreshes the entry's recency.
    pub fn get(&self, command: &str, params: &Map<String, Value>) -> Option<ExecutionResult> {
        let key = Self::key(command, params);
        let inner = &mut *self.inner.lock();

        let expired = match inner.entries.get(&key) {
            Some(entry) if !entry.is_expired() => {
                inner.hits += 1;
                tracing::debug!(command, "cache hit");
                return Some(entry.payload.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            tracing::debug!(command, "cache entry expired");
            inner.entries.pop(&key);
        }
        inner.misses += 1;
        tracing::debug!(command, "cache miss");
        None
    }

    /// Store a result, evicting the least-recently-used entry at capacity.
    ///
    /// Whether a result is worth caching is the caller's decision; the
    /// engine only stores successful, non-timed-out results.
    pub fn set(&self, command: &str, params: &Map<String, Value>, result: ExecutionResult) {
        let key = Self::key(command, params);
        let inner = &mut *self.inner.lock();

        let entry = CacheEntry {
            stored_at: Instant::now(),
            ttl: self.ttl,
            payload: result,
        };
        if let Some((evicted_key, _)) = inner.entries.push(key.clone(), entry)
            && evicted_key != key
        {
            inner.evictions += 1;
            tracing::debug!("evicted least-recently-used cache entry");
        }
        tracing::debug!(command, "cached result");
    }

    /// Current counters plus a footprint estimate.
    ///
    /// The footprint is measured by serializing each payload; when a payload
    /// cannot be measured the estimate degrades to a fixed per-entry guess
    /// instead of failing the stats call.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups > 0 {
            inner.hits as f64 / lookups as f64
        } else {
            0.0
        };

        let mut approx_memory_bytes = 0u64;
        for (_, entry) in inner.entries.iter() {
            match serde_json::to_vec(&entry.payload) {
                Ok(bytes) => approx_memory_bytes += bytes.len() as u64,
                Err(e) => {
                    tracing::warn!(error = %e, "payload footprint estimation failed, using fallback");
                    approx_memory_bytes = inner.entries.len() as u64 * CACHE_FOOTPRINT_FALLBACK_BYTES;
                    break;
                }
            }
        }

        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
            approx_memory_bytes,
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let inner = &mut *self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        tracing::info!("cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_order_independent() {
        let mut forward = Map::new();
        forward.insert("ports".to_string(), json!("1-1024"));
        forward.insert("host".to_string(), json!("10.0.0.5"));

        let mut backward = Map::new();
        backward.insert("host".to_string(), json!("10.0.0.5"));
        backward.insert("ports".to_string(), json!("1-1024"));

        assert_eq!(
            ResultCache::key("scan", &forward),
            ResultCache::key("scan", &backward)
        );
    }

    #[test]
    fn key_separates_different_commands() {
        let params = Map::new();
        assert_ne!(
            ResultCache::key("scan a", &params),
            ResultCache::key("scan b", &params)
        );
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = ResultCache::new(0, Duration::from_secs(60));
        assert_eq!(cache.stats().max_size, 1);
    }
}
