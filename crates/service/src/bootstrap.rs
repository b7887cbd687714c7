//! Wiring from configuration to a ready [`ServiceContext`].

use std::path::Path;
use std::sync::Arc;

use configs::{AppConfig, StorageConfig};
use tracing::info;

use crate::cache::MokaCacheStore;
use crate::context::ServiceContext;
use crate::events::BroadcastEventBus;
use crate::schema::SchemaProvider;
use crate::storage::{LocalStorage, MemoryStorage, StorageRegistry};

/// Location name served from memory instead of disk.
pub const MEMORY_LOCATION: &str = "memory";

/// One adapter per configured location. `memory` is kept in memory; `local`
/// lives at `local_root`, any other name in a directory of that name under it.
pub fn storage_registry(cfg: &StorageConfig) -> StorageRegistry {
    let root = Path::new(&cfg.local_root);
    let mut registry = StorageRegistry::new();
    for location in &cfg.locations {
        registry = match location.as_str() {
            MEMORY_LOCATION => registry.with(location.clone(), Arc::new(MemoryStorage::new())),
            "local" => registry.with(location.clone(), Arc::new(LocalStorage::new(root))),
            other => registry.with(location.clone(), Arc::new(LocalStorage::new(root.join(other)))),
        };
    }
    match cfg.default_location() {
        Some(default) => registry.with_default_location(default),
        None => registry,
    }
}

/// Initialize logging, connect, and assemble the collaborators `cfg` describes.
pub async fn build_context(cfg: &AppConfig, schema: Arc<dyn SchemaProvider>) -> anyhow::Result<ServiceContext> {
    common::utils::logging::init_logging(&cfg.logging);
    let db = models::db::connect_with_config(&cfg.database).await?;
    let storage = storage_registry(&cfg.storage);
    info!(
        locations = ?cfg.storage.locations,
        max_batch_mutation = ?cfg.items.max_batch_mutation,
        "service_context_ready"
    );
    Ok(ServiceContext::new(db, schema)
        .with_events(Arc::new(BroadcastEventBus::default()))
        .with_cache(Arc::new(MokaCacheStore::default()))
        .with_storage(storage)
        .with_items_config(cfg.items.clone())
        .with_user_limits(cfg.users.clone()))
}
