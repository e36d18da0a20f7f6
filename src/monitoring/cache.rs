//! Short-TTL snapshot cache.
//!
//! Readers load the current map through `ArcSwap` without locking. A refresh
//! builds a new map and swaps it in; a per-device async mutex makes concurrent
//! misses on one device share a single device poll.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct Entry<T> {
    value: Arc<T>,
    stored_at: Instant,
}

pub struct MonitoringCache<T> {
    ttl: Duration,
    entries: ArcSwap<HashMap<i32, Arc<Entry<T>>>>,
    refresh_locks: DashMap<i32, Arc<Mutex<()>>>,
}

impl<T: Send + Sync> MonitoringCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: ArcSwap::from_pointee(HashMap::new()),
            refresh_locks: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if younger than the TTL.
    pub fn get(&self, key: i32) -> Option<Arc<T>> {
        let entries = self.entries.load();
        entries
            .get(&key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: i32, value: Arc<T>) {
        let entry = Arc::new(Entry {
            value,
            stored_at: Instant::now(),
        });
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(key, entry.clone());
            next
        });
    }

    pub fn invalidate(&self, key: i32) {
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(&key);
            next
        });
    }

    /// Drops expired entries.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|(_, e)| e.stored_at.elapsed() < ttl)
                .map(|(k, e)| (*k, e.clone()))
                .collect::<HashMap<_, _>>()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached value or runs `refresh` once for all concurrent callers.
    ///
    /// A `None` from `refresh` is not cached, so the next caller polls again.
    pub async fn get_or_refresh<F, Fut>(&self, key: i32, refresh: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }

        let lock = self
            .refresh_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }

        debug!(key = key, "Monitoring cache miss, polling device.");
        let value = Arc::new(refresh().await?);
        self.insert(key, value.clone());
        Some(value)
    }
}
