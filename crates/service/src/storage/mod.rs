//! Storage adapters for uploaded file contents.
//!
//! Adapters are registered by location name; file records carry the location
//! in their `storage` field and the object key in `filename_disk`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::errors::ServiceError;

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Object written by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Write the whole stream under `key`, replacing any existing object.
    /// A failed write must not leave a partial object behind.
    async fn write(&self, key: &str, stream: &mut (dyn AsyncRead + Send + Unpin)) -> Result<StoredObject, ServiceError>;
    /// Remove `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
    async fn exists(&self, key: &str) -> Result<bool, ServiceError>;
}

/// Adapters by location name.
#[derive(Clone, Default)]
pub struct StorageRegistry {
    adapters: HashMap<String, Arc<dyn StorageAdapter>>,
    default_location: Option<String>,
}

impl StorageRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register `adapter` as `location`. The first registered location becomes the default.
    pub fn with(mut self, location: impl Into<String>, adapter: Arc<dyn StorageAdapter>) -> Self {
        let location = location.into();
        if self.default_location.is_none() {
            self.default_location = Some(location.clone());
        }
        self.adapters.insert(location, adapter);
        self
    }

    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = Some(location.into());
        self
    }

    pub fn default_location(&self) -> Option<&str> { self.default_location.as_deref() }

    pub fn get(&self, location: &str) -> Result<Arc<dyn StorageAdapter>, ServiceError> {
        self.adapters
            .get(location)
            .cloned()
            .ok_or_else(|| ServiceError::Validation(format!("unknown storage location `{location}`")))
    }

    pub fn contains(&self, location: &str) -> bool { self.adapters.contains_key(location) }
}

/// Keys are flat object names: no path separators, no parent references.
pub(crate) fn check_key(key: &str) -> Result<(), ServiceError> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
        return Err(ServiceError::Storage(format!("invalid object key `{key}`")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_location_is_default() {
        let registry = StorageRegistry::new()
            .with("local", Arc::new(MemoryStorage::new()))
            .with("s3", Arc::new(MemoryStorage::new()));
        assert_eq!(registry.default_location(), Some("local"));
        assert!(registry.get("s3").is_ok());
        assert!(matches!(registry.get("gcs"), Err(ServiceError::Validation(_))));

        let registry = registry.with_default_location("s3");
        assert_eq!(registry.default_location(), Some("s3"));
    }

    #[test]
    fn keys_cannot_escape_root() {
        assert!(check_key("a.png").is_ok());
        assert!(check_key("../a.png").is_err());
        assert!(check_key("dir/a.png").is_err());
        assert!(check_key("").is_err());
    }
}
