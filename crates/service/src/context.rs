use std::sync::Arc;

use configs::{ItemsConfig, UserLimitsConfig};
use sea_orm::DatabaseConnection;

use crate::cache::{CacheStore, NoopCache};
use crate::events::{EventBus, NoopEventBus};
use crate::fetch::{HttpFetcher, RemoteFetcher};
use crate::mutation::UserIntegrityChecker;
use crate::permissions::{AllowAll, PermissionEngine};
use crate::schema::SchemaProvider;
use crate::storage::StorageRegistry;

/// Connection plus collaborators shared by every service instance.
#[derive(Clone)]
pub struct ServiceContext {
    pub db: DatabaseConnection,
    pub schema: Arc<dyn SchemaProvider>,
    pub permissions: Arc<dyn PermissionEngine>,
    pub events: Arc<dyn EventBus>,
    pub cache: Arc<dyn CacheStore>,
    pub storage: StorageRegistry,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub integrity: UserIntegrityChecker,
    pub items: ItemsConfig,
}

impl ServiceContext {
    /// Context with permissive, silent collaborators. Swap them with the `with_*` builders.
    pub fn new(db: DatabaseConnection, schema: Arc<dyn SchemaProvider>) -> Self {
        Self {
            db,
            schema,
            permissions: Arc::new(AllowAll),
            events: Arc::new(NoopEventBus),
            cache: Arc::new(NoopCache),
            storage: StorageRegistry::new(),
            fetcher: Arc::new(HttpFetcher::default()),
            integrity: UserIntegrityChecker::default(),
            items: ItemsConfig::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionEngine>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_storage(mut self, storage: StorageRegistry) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_user_limits(mut self, limits: UserLimitsConfig) -> Self {
        self.integrity = UserIntegrityChecker::new(limits);
        self
    }

    pub fn with_items_config(mut self, items: ItemsConfig) -> Self {
        self.items = items;
        self
    }
}
