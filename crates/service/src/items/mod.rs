//! CRUD over one collection through the shared mutation pipeline.
//!
//! Every public mutation has two forms: `x(...)` opens its own transaction and
//! resolves it, `x_in(ctx, ...)` joins a caller's [`MutationContext`] so the
//! writes, tracker, integrity requests, events and purges all land there.

use std::sync::Arc;

use models::schema::CollectionSchema;
use models::PrimaryKey;
use serde_json::Value;

use crate::context::ServiceContext;
use crate::errors::ServiceError;
use crate::events::{ActionEventParams, EventContext};
use crate::mutation::{MutationContext, MutationOptions, MutationTracker};
use crate::permissions::{authorize, Accountability, FieldAccess, PermissionAction};
use crate::schema::resolve;

mod mutate;
mod read;
mod singleton;

/// Read-side switches.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Drop the primary key from results when the query did not ask for it.
    pub strip_non_requested: bool,
    /// Action whose field access limits the result.
    pub permissions_action: PermissionAction,
    pub emit_events: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { strip_non_requested: true, permissions_action: PermissionAction::Read, emit_events: true }
    }
}

impl QueryOptions {
    pub fn without_events(mut self) -> Self {
        self.emit_events = false;
        self
    }
}

#[derive(Clone)]
pub struct ItemsService {
    collection: String,
    services: ServiceContext,
    accountability: Option<Accountability>,
}

impl ItemsService {
    pub fn new(collection: impl Into<String>, services: ServiceContext) -> Self {
        Self { collection: collection.into(), services, accountability: None }
    }

    /// Act on behalf of `accountability`; without one every field is accessible.
    pub fn with_accountability(mut self, accountability: Accountability) -> Self {
        self.accountability = Some(accountability);
        self
    }

    pub fn collection(&self) -> &str { &self.collection }

    pub fn services(&self) -> &ServiceContext { &self.services }

    pub fn accountability(&self) -> Option<&Accountability> { self.accountability.as_ref() }

    /// Tracker capped by `max_batch_mutation`, to share across several calls.
    pub fn create_mutation_tracker(&self, initial: u64) -> MutationTracker {
        MutationTracker::new(initial, self.services.items.max_batch_mutation)
    }

    /// Open a context for a sequence of `_in` calls.
    pub async fn begin(&self, opts: &MutationOptions) -> Result<MutationContext, ServiceError> {
        MutationContext::begin(&self.services, opts).await
    }

    pub(crate) fn schema(&self) -> Result<Arc<CollectionSchema>, ServiceError> {
        resolve(self.services.schema.as_ref(), &self.collection)
    }

    pub(crate) async fn access(&self, action: PermissionAction) -> Result<FieldAccess, ServiceError> {
        authorize(self.services.permissions.as_ref(), self.accountability.as_ref(), &self.collection, action).await
    }

    pub(crate) fn action(&self, action: &str, meta: Value) -> ActionEventParams {
        let context = EventContext {
            collection: self.collection.clone(),
            user: self.accountability.as_ref().and_then(|a| a.user.clone()),
            role: self.accountability.as_ref().and_then(|a| a.role.clone()),
        };
        ActionEventParams::new(&self.collection, action, meta, context)
    }
}

pub(crate) fn keys_json(keys: &[PrimaryKey]) -> Value { Value::Array(keys.iter().map(PrimaryKey::to_json).collect()) }
