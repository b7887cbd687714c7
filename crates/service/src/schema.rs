//! Schema introspection boundary.

use std::collections::HashMap;
use std::sync::Arc;

use models::schema::{system_collections, CollectionSchema};

use crate::errors::ServiceError;

/// Supplies collection shapes. Implementations are expected to be cheap to query.
pub trait SchemaProvider: Send + Sync {
    fn collection(&self, name: &str) -> Option<Arc<CollectionSchema>>;
}

/// In-memory schema snapshot.
#[derive(Debug, Clone, Default)]
pub struct SchemaOverview {
    collections: HashMap<String, Arc<CollectionSchema>>,
}

impl SchemaOverview {
    pub fn new() -> Self { Self::default() }

    /// Snapshot holding the system tables managed by the migration crate.
    pub fn with_system_collections() -> Self {
        let mut overview = Self::new();
        for schema in system_collections() {
            overview.collections.insert(schema.name.clone(), Arc::new(schema));
        }
        overview
    }

    pub fn insert(&mut self, schema: CollectionSchema) -> Result<(), ServiceError> {
        schema.validate()?;
        self.collections.insert(schema.name.clone(), Arc::new(schema));
        Ok(())
    }

    pub fn with(mut self, schema: CollectionSchema) -> Result<Self, ServiceError> {
        self.insert(schema)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaProvider for SchemaOverview {
    fn collection(&self, name: &str) -> Option<Arc<CollectionSchema>> { self.collections.get(name).cloned() }
}

pub(crate) fn resolve(provider: &dyn SchemaProvider, collection: &str) -> Result<Arc<CollectionSchema>, ServiceError> {
    provider
        .collection(collection)
        .ok_or_else(|| ServiceError::not_found(&format!("collection {collection}")))
}
