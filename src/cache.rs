// src/cache.rs
//! Result cache: one immutable snapshot per query shape, kept for an absolute TTL.
//!
//! - Snapshots are `Arc`s swapped under a short `RwLock`; readers never wait for a compute.
//! - At most one computation per shape is in flight (per-entry `tokio::sync::Mutex`).
//! - While a refresh is running, non-forcing callers get the previous snapshot (`Stale`);
//!   without a previous snapshot they wait for the running computation.
//! - Inserting a new shape evicts every shape whose snapshot has expired and that nobody
//!   is computing or waiting on, so the map stays bounded by the shapes seen within a TTL.

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// How a lookup was served. Exposed to clients as the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Previous snapshot served while another caller recomputes.
    Stale,
    /// Forced recomputation.
    Refresh,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
            CacheStatus::Refresh => "REFRESH",
        }
    }
}

struct Stored<V> {
    value: Arc<V>,
    stored_at: Instant,
}

struct Entry<V> {
    current: RwLock<Option<Stored<V>>>,
    inflight: tokio::sync::Mutex<()>,
}

impl<V> Entry<V> {
    fn new() -> Self {
        Self {
            current: RwLock::new(None),
            inflight: tokio::sync::Mutex::new(()),
        }
    }

    fn latest(&self) -> Option<Arc<V>> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().map(|s| s.value.clone())
    }

    fn fresh(&self, ttl: Duration) -> Option<Arc<V>> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|s| s.stored_at.elapsed() < ttl)
            .map(|s| s.value.clone())
    }

    fn swap(&self, value: Arc<V>) {
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Stored {
            value,
            stored_at: Instant::now(),
        });
    }
}

pub struct ResultCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Arc<Entry<V>>>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of query shapes currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &K) -> Arc<Entry<V>> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(e) = map.get(key) {
            return e.clone();
        }

        let before = map.len();
        // An outstanding `Arc` means a lookup for that shape is still running.
        map.retain(|_, e| Arc::strong_count(e) > 1 || e.fresh(self.ttl).is_some());
        let evicted = before - map.len();
        if evicted > 0 {
            tracing::debug!(target: "cache", evicted, remaining = map.len(), "expired shapes evicted");
        }

        let entry = Arc::new(Entry::new());
        map.insert(key.clone(), entry.clone());
        entry
    }

    /// Return the snapshot for `key`, computing it when missing, expired or forced.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &K,
        force: bool,
        compute: F,
    ) -> (Arc<V>, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let entry = self.entry(key);

        if !force {
            if let Some(v) = entry.fresh(self.ttl) {
                return record(v, CacheStatus::Hit);
            }
        }

        let _guard = match entry.inflight.try_lock() {
            Ok(g) => g,
            Err(_) => {
                if !force {
                    if let Some(v) = entry.latest() {
                        return record(v, CacheStatus::Stale);
                    }
                }
                entry.inflight.lock().await
            }
        };

        // Someone else may have finished while we waited for the lock.
        if !force {
            if let Some(v) = entry.fresh(self.ttl) {
                return record(v, CacheStatus::Hit);
            }
        }

        let value = Arc::new(compute().await);
        entry.swap(value.clone());
        let status = if force {
            CacheStatus::Refresh
        } else {
            CacheStatus::Miss
        };
        record(value, status)
    }
}

fn record<V>(value: Arc<V>, status: CacheStatus) -> (Arc<V>, CacheStatus) {
    metrics::counter!("cache_lookups_total", "outcome" => status.as_str()).increment(1);
    tracing::debug!(target: "cache", outcome = status.as_str(), "cache lookup");
    (value, status)
}
