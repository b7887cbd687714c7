use std::collections::HashSet;

use models::query::Query;
use models::schema::CollectionSchema;
use models::{Item, PrimaryKey};
use serde_json::json;
use tracing::{info, instrument};

use super::{keys_json, ItemsService};
use crate::errors::ServiceError;
use crate::mutation::integrity::required_checks;
use crate::mutation::{MutationContext, MutationOptions, RevisionAction, RevisionRecorder};
use crate::payload;
use crate::permissions::PermissionAction;
use crate::sql;

/// Drop repeated keys, keeping first-seen order.
fn distinct(keys: &[PrimaryKey]) -> Vec<PrimaryKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().filter(|k| seen.insert(*k)).cloned().collect()
}

impl ItemsService {
    async fn ensure_exist(&self, ctx: &MutationContext, schema: &CollectionSchema, keys: &[PrimaryKey]) -> Result<(), ServiceError> {
        let missing = sql::missing_keys(ctx.txn(), schema, keys).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::not_found(&format!("{} items {}", schema.name, keys_json(&missing))))
        }
    }

    /// Record revisions for `keys`, loading the stored rows when the collection tracks them.
    async fn record_revisions(
        &self,
        ctx: &MutationContext,
        schema: &CollectionSchema,
        opts: &MutationOptions,
        action: RevisionAction,
        keys: &[PrimaryKey],
        delta: Option<&Item>,
    ) -> Result<(), ServiceError> {
        let recorder = RevisionRecorder::new(schema, opts);
        let rows = if recorder.tracks() && action != RevisionAction::Delete {
            sql::fetch_by_keys(ctx.txn(), schema, keys).await?
        } else {
            Vec::new()
        };
        for key in keys {
            let data = rows.iter().find(|row| sql::key_of(schema, row).ok().as_ref() == Some(key));
            recorder.record(ctx.txn(), action, key, data, delta).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, data, opts), fields(collection = %self.collection))]
    pub async fn create_one(&self, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.create_one_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn create_one_in(&self, ctx: &mut MutationContext, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut keys = self.create_many_in(ctx, vec![data], opts).await?;
        keys.pop().ok_or_else(|| ServiceError::Validation(format!("nothing created in {}", self.collection)))
    }

    /// Create every item or none.
    #[instrument(skip(self, data, opts), fields(collection = %self.collection, count = data.len()))]
    pub async fn create_many(&self, data: Vec<Item>, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.create_many_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn create_many_in(
        &self,
        ctx: &mut MutationContext,
        data: Vec<Item>,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        ctx.begin_mutation(opts)?;
        let schema = self.schema()?;
        let access = self.access(PermissionAction::Create).await?;
        let prepared = data
            .into_iter()
            .map(|item| payload::prepare_create(&schema, &access, item))
            .collect::<Result<Vec<_>, _>>()?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }
        ctx.request_integrity_check(required_checks(&schema.name, PermissionAction::Create, None));
        // the whole batch counts before the first insert
        ctx.track(prepared.len() as u64, opts)?;

        let reset_sequence = !opts.bypass_auto_increment_sequence_reset && schema.primary_field()?.auto_increment;
        let mut keys = Vec::with_capacity(prepared.len());
        for (key, values) in prepared {
            let explicit_key = key.is_some();
            let key = sql::insert(ctx.txn(), &schema, &values, key).await?;
            if explicit_key && reset_sequence {
                sql::reset_sequence(ctx.txn(), &schema).await?;
            }

            self.record_revisions(ctx, &schema, opts, RevisionAction::Create, std::slice::from_ref(&key), Some(&values))
                .await?;
            ctx.queue_action(opts, self.action("create", json!({ "key": key.to_json(), "payload": values })));
            info!(collection = %self.collection, key = %key, "item_created");
            keys.push(key);
        }
        ctx.queue_purge(opts, &schema);
        Ok(keys)
    }

    #[instrument(skip(self, data, opts), fields(collection = %self.collection, key = %key))]
    pub async fn update_one(&self, key: &PrimaryKey, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.update_one_in(&mut ctx, key, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn update_one_in(
        &self,
        ctx: &mut MutationContext,
        key: &PrimaryKey,
        data: Item,
        opts: &MutationOptions,
    ) -> Result<PrimaryKey, ServiceError> {
        let mut keys = self.update_many_in(ctx, std::slice::from_ref(key), data, opts).await?;
        keys.pop().ok_or_else(|| ServiceError::not_found(&format!("{} item {key}", self.collection)))
    }

    /// Apply one payload to every key. All keys must exist.
    #[instrument(skip(self, keys, data, opts), fields(collection = %self.collection, count = keys.len()))]
    pub async fn update_many(&self, keys: &[PrimaryKey], data: Item, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.update_many_in(&mut ctx, keys, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn update_many_in(
        &self,
        ctx: &mut MutationContext,
        keys: &[PrimaryKey],
        data: Item,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        ctx.begin_mutation(opts)?;
        let keys = distinct(keys);
        let schema = self.schema()?;
        let access = self.access(PermissionAction::Update).await?;
        let checks = required_checks(&schema.name, PermissionAction::Update, Some(&data));
        let target = if keys.len() == 1 { keys.first() } else { None };
        let values = payload::prepare_update(&schema, &access, target, data)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        ctx.request_integrity_check(checks);
        self.ensure_exist(ctx, &schema, &keys).await?;
        ctx.track(keys.len() as u64, opts)?;

        sql::update(ctx.txn(), &schema, &keys, &values).await?;

        self.record_revisions(ctx, &schema, opts, RevisionAction::Update, &keys, Some(&values)).await?;
        ctx.queue_action(opts, self.action("update", json!({ "keys": keys_json(&keys), "payload": values })));
        ctx.queue_purge(opts, &schema);
        info!(collection = %self.collection, count = keys.len(), "items_updated");
        Ok(keys)
    }

    /// Apply `data` to every item `query` selects. Selecting nothing is not an error.
    #[instrument(skip(self, query, data, opts), fields(collection = %self.collection))]
    pub async fn update_by_query(&self, query: &Query, data: Item, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.update_by_query_in(&mut ctx, query, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn update_by_query_in(
        &self,
        ctx: &mut MutationContext,
        query: &Query,
        data: Item,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        ctx.begin_mutation(opts)?;
        let keys = self.get_keys_by_query_in(ctx, query).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.update_many_in(ctx, &keys, data, opts).await
    }

    /// Each item carries its own key and payload. One transaction for the whole batch.
    #[instrument(skip(self, data, opts), fields(collection = %self.collection, count = data.len()))]
    pub async fn update_batch(&self, data: Vec<Item>, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.update_batch_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn update_batch_in(
        &self,
        ctx: &mut MutationContext,
        data: Vec<Item>,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        let schema = self.schema()?;
        let mut keys = Vec::with_capacity(data.len());
        for item in data {
            let key = item
                .get(&schema.primary_key)
                .and_then(PrimaryKey::from_json)
                .ok_or_else(|| ServiceError::Validation(format!("batch item without `{}`", schema.primary_key)))?;
            keys.push(self.update_one_in(ctx, &key, item, opts).await?);
        }
        Ok(keys)
    }

    /// Update when the payload's key resolves to a row, create otherwise.
    #[instrument(skip(self, data, opts), fields(collection = %self.collection))]
    pub async fn upsert_one(&self, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.upsert_one_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn upsert_one_in(&self, ctx: &mut MutationContext, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let schema = self.schema()?;
        let key = data.get(&schema.primary_key).and_then(PrimaryKey::from_json);
        if let Some(key) = key {
            let missing = sql::missing_keys(ctx.txn(), &schema, std::slice::from_ref(&key)).await?;
            if missing.is_empty() {
                return self.update_one_in(ctx, &key, data, opts).await;
            }
        }
        self.create_one_in(ctx, data, opts).await
    }

    #[instrument(skip(self, data, opts), fields(collection = %self.collection, count = data.len()))]
    pub async fn upsert_many(&self, data: Vec<Item>, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.upsert_many_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn upsert_many_in(
        &self,
        ctx: &mut MutationContext,
        data: Vec<Item>,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut keys = Vec::with_capacity(data.len());
        for item in data {
            keys.push(self.upsert_one_in(ctx, item, opts).await?);
        }
        Ok(keys)
    }

    #[instrument(skip(self, opts), fields(collection = %self.collection, key = %key))]
    pub async fn delete_one(&self, key: &PrimaryKey, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.delete_one_in(&mut ctx, key, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn delete_one_in(&self, ctx: &mut MutationContext, key: &PrimaryKey, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut keys = self.delete_many_in(ctx, std::slice::from_ref(key), opts).await?;
        keys.pop().ok_or_else(|| ServiceError::not_found(&format!("{} item {key}", self.collection)))
    }

    /// Delete every key or none. All keys must exist.
    #[instrument(skip(self, keys, opts), fields(collection = %self.collection, count = keys.len()))]
    pub async fn delete_many(&self, keys: &[PrimaryKey], opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.delete_many_in(&mut ctx, keys, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn delete_many_in(
        &self,
        ctx: &mut MutationContext,
        keys: &[PrimaryKey],
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        ctx.begin_mutation(opts)?;
        let keys = distinct(keys);
        let schema = self.schema()?;
        self.access(PermissionAction::Delete).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        ctx.request_integrity_check(required_checks(&schema.name, PermissionAction::Delete, None));
        self.ensure_exist(ctx, &schema, &keys).await?;
        ctx.track(keys.len() as u64, opts)?;

        sql::delete(ctx.txn(), &schema, &keys).await?;

        self.record_revisions(ctx, &schema, opts, RevisionAction::Delete, &keys, None).await?;
        ctx.queue_action(opts, self.action("delete", json!({ "keys": keys_json(&keys) })));
        ctx.queue_purge(opts, &schema);
        info!(collection = %self.collection, count = keys.len(), "items_deleted");
        Ok(keys)
    }

    #[instrument(skip(self, query, opts), fields(collection = %self.collection))]
    pub async fn delete_by_query(&self, query: &Query, opts: &MutationOptions) -> Result<Vec<PrimaryKey>, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.delete_by_query_in(&mut ctx, query, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn delete_by_query_in(
        &self,
        ctx: &mut MutationContext,
        query: &Query,
        opts: &MutationOptions,
    ) -> Result<Vec<PrimaryKey>, ServiceError> {
        ctx.begin_mutation(opts)?;
        let keys = self.get_keys_by_query_in(ctx, query).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.delete_many_in(ctx, &keys, opts).await
    }
}
