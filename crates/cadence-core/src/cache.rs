//! TTL result cache used by the query bus.
//!
//! Entries carry an absolute expiry. Reads evict an expired entry lazily;
//! `sweep` (run periodically by `spawn_sweeper`) purges the rest.
//!
//! Expiry uses `tokio::time::Instant` so paused-clock tests can advance it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Default entry lifetime when a query does not request one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Derive the cache key for a query that did not supply one.
///
/// The key is `<query_type>:<sha256 hex>` where the digest covers the type
/// and the params' JSON text. `serde_json` emits object keys in sorted
/// order, so equal params always hash equally. Keeping the type as a
/// readable prefix lets `invalidate` target every entry of one query type.
pub fn cache_key(query_type: &str, params: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query_type.as_bytes());
    hasher.update(b":");
    hasher.update(params.to_string().as_bytes());
    format!("{}:{}", query_type, hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: serde_json::Value,
    expires_at: Instant,
}

/// A keyed cache of successful query results.
#[derive(Debug)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl QueryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the live entry for `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "evicted expired cache entry on read");
                None
            }
            None => None,
        }
    }

    /// Store `data` under `key` for `ttl`, or the default TTL.
    pub fn insert(&self, key: impl Into<String>, data: serde_json::Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            data,
            expires_at: Instant::now() + ttl,
        };
        self.lock().insert(key.into(), entry);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Remove every key containing `pattern`, or everything when `None`.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        match pattern {
            Some(p) => entries.retain(|key, _| !key.contains(p)),
            None => entries.clear(),
        }
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sweep on a fixed interval until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "query cache sweep");
                }
            }
        })
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
