use std::collections::BTreeSet;
use std::sync::Arc;

use models::schema::CollectionSchema;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::{debug, warn};

use super::{IntegrityObserver, MutationOptions, MutationTracker, UserIntegrityCheckFlag};
use crate::context::ServiceContext;
use crate::errors::ServiceError;
use crate::events::{ActionEventParams, EventSink};
use crate::storage::StorageAdapter;

/// State of one top-level mutation. Owns the transaction; nested calls borrow
/// it mutably and stage their writes, events and purges here.
///
/// Nothing leaves the context until [`MutationContext::finish`]: the integrity
/// check runs against the staged writes, then the transaction commits, then
/// queued events are emitted and caches purged.
pub struct MutationContext {
    txn: DatabaseTransaction,
    tracker: MutationTracker,
    pending_checks: UserIntegrityCheckFlag,
    integrity_observer: Option<IntegrityObserver>,
    actions: Vec<ActionEventParams>,
    purge_collections: BTreeSet<String>,
    purge_system: bool,
    written_objects: Vec<(Arc<dyn StorageAdapter>, String)>,
    superseded_objects: Vec<(Arc<dyn StorageAdapter>, String)>,
}

impl MutationContext {
    /// Open a transaction. Counts against `opts.mutation_tracker` when given,
    /// else against a fresh tracker capped by `max_batch_mutation`.
    pub async fn begin(services: &ServiceContext, opts: &MutationOptions) -> Result<Self, ServiceError> {
        let txn = services.db.begin().await?;
        let tracker = opts
            .mutation_tracker
            .clone()
            .unwrap_or_else(|| MutationTracker::new(0, services.items.max_batch_mutation));
        Ok(Self {
            txn,
            tracker,
            pending_checks: UserIntegrityCheckFlag::empty(),
            integrity_observer: None,
            actions: Vec::new(),
            purge_collections: BTreeSet::new(),
            purge_system: false,
            written_objects: Vec::new(),
            superseded_objects: Vec::new(),
        })
    }

    pub fn txn(&self) -> &DatabaseTransaction { &self.txn }

    pub fn tracker(&self) -> &MutationTracker { &self.tracker }

    pub fn pending_checks(&self) -> UserIntegrityCheckFlag { self.pending_checks }

    pub fn request_integrity_check(&mut self, flags: UserIntegrityCheckFlag) { self.pending_checks |= flags; }

    /// Actions staged for emission after commit.
    pub fn queued_actions(&self) -> &[ActionEventParams] { &self.actions }

    /// Entry step shared by every mutation: raise the caller's pre-mutation
    /// error, then merge its integrity request and observer.
    pub(crate) fn begin_mutation(&mut self, opts: &MutationOptions) -> Result<(), ServiceError> {
        if let Some(err) = &opts.pre_mutation_error {
            return Err(err.clone());
        }
        self.request_integrity_check(opts.user_integrity_check_flags);
        if self.integrity_observer.is_none() {
            self.integrity_observer = opts.on_require_user_integrity_check.clone();
        }
        Ok(())
    }

    pub(crate) fn track(&self, count: u64, opts: &MutationOptions) -> Result<u64, ServiceError> {
        self.tracker.track(count, opts.bypass_limits)
    }

    /// Route an action to the caller's collector, or stage it for the bus.
    pub(crate) fn queue_action(&mut self, opts: &MutationOptions, params: ActionEventParams) {
        if !opts.emit_events {
            return;
        }
        match &opts.event_sink {
            EventSink::Emit => self.actions.push(params),
            EventSink::Collect(collector) => collector.push(params),
        }
    }

    pub(crate) fn queue_purge(&mut self, opts: &MutationOptions, schema: &CollectionSchema) {
        if opts.auto_purge_cache {
            self.purge_collections.insert(schema.name.clone());
        }
        if opts.auto_purge_system_cache && schema.is_system() {
            self.purge_system = true;
        }
    }

    /// Object to delete if the transaction does not commit.
    pub(crate) fn track_written_object(&mut self, adapter: Arc<dyn StorageAdapter>, key: String) {
        self.written_objects.push((adapter, key));
    }

    /// Object to delete once the transaction has committed.
    pub(crate) fn track_superseded_object(&mut self, adapter: Arc<dyn StorageAdapter>, key: String) {
        self.superseded_objects.push((adapter, key));
    }

    /// Resolve the operation: roll back on error; otherwise run the pending
    /// integrity check, commit, then emit queued events and purge caches.
    pub async fn finish<T>(self, services: &ServiceContext, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        let MutationContext {
            txn,
            pending_checks,
            integrity_observer,
            actions,
            purge_collections,
            purge_system,
            written_objects,
            superseded_objects,
            ..
        } = self;

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                rollback(txn, written_objects, &err).await;
                return Err(err);
            }
        };

        if !pending_checks.is_empty() {
            if let Some(observer) = &integrity_observer {
                observer(pending_checks);
            }
            if let Err(err) = services.integrity.check(&txn, pending_checks).await {
                rollback(txn, written_objects, &err).await;
                return Err(err);
            }
        }

        if let Err(e) = txn.commit().await {
            let err = ServiceError::from(e);
            warn!(error = %err, "mutation_commit_failed");
            remove_objects(&written_objects).await;
            return Err(err);
        }
        debug!(actions = actions.len(), purges = purge_collections.len(), "mutation_committed");

        for params in actions {
            services.events.emit(params);
        }
        for collection in &purge_collections {
            services.cache.purge(collection);
        }
        if purge_system {
            services.cache.purge_system();
        }
        remove_objects(&superseded_objects).await;
        Ok(value)
    }
}

async fn rollback(txn: DatabaseTransaction, written_objects: Vec<(Arc<dyn StorageAdapter>, String)>, cause: &ServiceError) {
    debug!(error = %cause, code = cause.code(), "mutation_rolled_back");
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "mutation_rollback_failed");
    }
    remove_objects(&written_objects).await;
}

async fn remove_objects(objects: &[(Arc<dyn StorageAdapter>, String)]) {
    for (adapter, key) in objects {
        match adapter.delete(key).await {
            Ok(()) => debug!(key = %key, "storage_object_removed"),
            Err(e) => warn!(key = %key, error = %e, "storage_object_not_removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionCollector, EventContext};
    use crate::test_support::{test_services, RecordingCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

    fn params() -> ActionEventParams {
        ActionEventParams::new("articles", "create", json!({}), EventContext::default())
    }

    #[tokio::test]
    async fn pre_mutation_error_is_raised() -> Result<(), anyhow::Error> {
        let services = test_services().await?;
        let opts = MutationOptions::new().fail_with(ServiceError::Forbidden("read only".into()));
        let mut ctx = MutationContext::begin(&services, &opts).await?;
        assert_eq!(ctx.begin_mutation(&opts), Err(ServiceError::Forbidden("read only".into())));
        Ok(())
    }

    #[tokio::test]
    async fn observer_sees_combined_flags_once() -> Result<(), anyhow::Error> {
        let services = test_services().await?;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicU8::new(0));
        let (c, s) = (calls.clone(), seen.clone());
        let outer = MutationOptions::new()
            .request_integrity_check(UserIntegrityCheckFlag::USER_LIMITS)
            .on_integrity_check(move |flags| {
                c.fetch_add(1, Ordering::SeqCst);
                s.store(flags.bits(), Ordering::SeqCst);
            });
        let nested = MutationOptions::new().request_integrity_check(UserIntegrityCheckFlag::USER_LIMITS);

        let mut ctx = MutationContext::begin(&services, &outer).await?;
        ctx.begin_mutation(&outer)?;
        ctx.begin_mutation(&nested)?;
        ctx.finish(&services, Ok(())).await?;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.load(Ordering::SeqCst), UserIntegrityCheckFlag::USER_LIMITS.bits());
        Ok(())
    }

    #[tokio::test]
    async fn disabled_events_skip_collector_too() -> Result<(), anyhow::Error> {
        let services = test_services().await?;
        let collector = ActionCollector::new();
        let opts = MutationOptions::new().collect_actions(collector.clone()).without_events();
        let mut ctx = MutationContext::begin(&services, &opts).await?;
        ctx.queue_action(&opts, params());
        assert!(collector.is_empty());
        assert!(ctx.queued_actions().is_empty());

        let collecting = MutationOptions::new().collect_actions(collector.clone());
        ctx.queue_action(&collecting, params());
        assert_eq!(collector.len(), 1);
        assert!(ctx.queued_actions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn purges_wait_for_commit() -> Result<(), anyhow::Error> {
        let cache = Arc::new(RecordingCache::default());
        let services = test_services().await?.with_cache(cache.clone());
        let schema = crate::test_support::articles_schema();
        let opts = MutationOptions::new();

        let mut ctx = MutationContext::begin(&services, &opts).await?;
        ctx.queue_purge(&opts, &schema);
        let failed: Result<(), ServiceError> = Err(ServiceError::Validation("bad".into()));
        assert!(ctx.finish(&services, failed).await.is_err());
        assert!(cache.purged().is_empty());

        let mut ctx = MutationContext::begin(&services, &opts).await?;
        ctx.queue_purge(&opts, &schema);
        ctx.finish(&services, Ok(())).await?;
        assert_eq!(cache.purged(), vec!["articles".to_string()]);
        assert_eq!(cache.system_purges(), 0);
        Ok(())
    }
}
