//! Cache invalidation boundary.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};

/// Invalidation side of the cache. Calls are fire-and-forget.
pub trait CacheStore: Send + Sync {
    /// Drop everything cached for one collection.
    fn purge(&self, collection: &str);
    /// Drop cached system data (schema, permissions).
    fn purge_system(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl CacheStore for NoopCache {
    fn purge(&self, _: &str) {}
    fn purge_system(&self) {}
}

/// moka-backed cache: item payloads keyed by `(collection, key)` plus a system area.
#[derive(Clone)]
pub struct MokaCacheStore {
    items: Cache<(String, String), Arc<Value>>,
    system: Cache<String, Arc<Value>>,
}

impl MokaCacheStore {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let items = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        let system = Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build();
        Self { items, system }
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, collection: &str, key: &str) -> Option<Arc<Value>> {
        self.items.get(&(collection.to_string(), key.to_string())).await
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, collection: &str, key: &str, value: Value) {
        self.items.insert((collection.to_string(), key.to_string()), Arc::new(value)).await;
    }

    #[cfg(test)]
    pub(crate) async fn get_system(&self, key: &str) -> Option<Arc<Value>> { self.system.get(key).await }

    #[cfg(test)]
    pub(crate) async fn insert_system(&self, key: &str, value: Value) { self.system.insert(key.to_string(), Arc::new(value)).await; }
}

impl Default for MokaCacheStore {
    fn default() -> Self { Self::new(10_000, Duration::from_secs(300)) }
}

impl CacheStore for MokaCacheStore {
    fn purge(&self, collection: &str) {
        let target = collection.to_string();
        match self.items.invalidate_entries_if(move |k: &(String, String), _: &Arc<Value>| k.0 == target) {
            Ok(_) => debug!(collection, "cache_purged"),
            Err(e) => {
                warn!(collection, error = %e, "cache_purge_predicate_rejected");
                self.items.invalidate_all();
            }
        }
    }

    fn purge_system(&self) {
        self.system.invalidate_all();
        debug!("system_cache_purged");
    }
}
