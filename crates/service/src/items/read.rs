use models::query::{Filter, Limit, Query};
use models::schema::CollectionSchema;
use models::{Item, PrimaryKey};
use sea_orm::ConnectionTrait;
use serde_json::json;
use tracing::{debug, instrument};

use super::{keys_json, ItemsService, QueryOptions};
use crate::errors::ServiceError;
use crate::mutation::MutationContext;
use crate::permissions::{FieldAccess, PermissionAction};
use crate::sql;

/// Columns to select and whether the primary key was added on top of the request.
fn select_columns(schema: &CollectionSchema, query: &Query, access: &FieldAccess) -> Result<(Vec<String>, bool), ServiceError> {
    let referenced = query
        .filter
        .iter()
        .flat_map(Filter::fields)
        .chain(query.sort.iter().map(|s| s.field.as_str()));
    for name in referenced {
        if schema.get_field(name).is_some() && !access.allows(name) {
            return Err(ServiceError::Forbidden(format!("field `{name}` on {} is not readable", schema.name)));
        }
    }

    if query.selects_all_fields() {
        let columns = schema.fields.keys().filter(|f| access.allows(f)).cloned().collect();
        return Ok((columns, false));
    }

    let mut columns = Vec::new();
    for name in query.fields.iter().flatten() {
        if schema.get_field(name).is_none() {
            return Err(ServiceError::Validation(format!("unknown field `{name}` on {}", schema.name)));
        }
        if !access.allows(name) {
            return Err(ServiceError::Forbidden(format!("field `{name}` on {} is not readable", schema.name)));
        }
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    let added_key = !columns.contains(&schema.primary_key);
    if added_key {
        columns.push(schema.primary_key.clone());
    }
    Ok((columns, added_key))
}

impl ItemsService {
    /// Page size for a query: the configured default when unset, never above the maximum.
    pub(crate) fn page_limit(&self, limit: Option<Limit>) -> Option<u64> {
        let cfg = &self.services.items;
        let cap = |n: u64| cfg.query_limit_max.map_or(n, |max| n.min(max));
        match limit {
            None => Some(cap(cfg.query_limit_default)),
            Some(Limit::Count(n)) => Some(cap(n)),
            Some(Limit::Unlimited) => cfg.query_limit_max,
        }
    }

    pub(crate) async fn fetch_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        query: &Query,
        opts: &QueryOptions,
        limit: Option<u64>,
    ) -> Result<Vec<Item>, ServiceError> {
        let schema = self.schema()?;
        let access = self.access(opts.permissions_action).await?;
        let (columns, added_key) = select_columns(&schema, query, &access)?;
        let mut items = sql::fetch(conn, &schema, &columns, query, limit).await?;
        if added_key && opts.strip_non_requested {
            for item in &mut items {
                item.remove(&schema.primary_key);
            }
        }
        Ok(items)
    }

    fn emit_read(&self, query: &Query, count: usize, opts: &QueryOptions, also_query: bool) {
        if !opts.emit_events {
            return;
        }
        let query_json = serde_json::to_value(query).unwrap_or_default();
        if also_query {
            self.services.events.emit(self.action("query", json!({ "query": query_json })));
        }
        self.services.events.emit(self.action("read", json!({ "query": query_json, "count": count })));
    }

    #[instrument(skip(self, query, opts), fields(collection = %self.collection))]
    pub async fn read_by_query(&self, query: &Query, opts: &QueryOptions) -> Result<Vec<Item>, ServiceError> {
        let limit = self.page_limit(query.limit);
        let items = self.fetch_items(&self.services.db, query, opts, limit).await?;
        debug!(count = items.len(), "items_read");
        self.emit_read(query, items.len(), opts, true);
        Ok(items)
    }

    /// One item; `NotFound` when no row has `key` (or the filter in `query` excludes it).
    #[instrument(skip(self, query, opts), fields(collection = %self.collection, key = %key))]
    pub async fn read_one(&self, key: &PrimaryKey, query: &Query, opts: &QueryOptions) -> Result<Item, ServiceError> {
        let schema = self.schema()?;
        let query = Query { limit: None, offset: None, ..query.clone() }.filter(Filter::eq(schema.primary_key.clone(), key.to_json()));
        let mut items = self.fetch_items(&self.services.db, &query, opts, Some(1)).await?;
        let item = items.pop().ok_or_else(|| ServiceError::not_found(&format!("{} item {key}", self.collection)))?;
        self.emit_read(&query, 1, opts, false);
        Ok(item)
    }

    /// Items for `keys` in the query's sort order (primary key order by default).
    /// Missing keys are skipped.
    #[instrument(skip(self, keys, query, opts), fields(collection = %self.collection, keys = keys.len()))]
    pub async fn read_many(&self, keys: &[PrimaryKey], query: &Query, opts: &QueryOptions) -> Result<Vec<Item>, ServiceError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.schema()?;
        let query = Query { limit: None, offset: None, ..query.clone() }
            .filter(Filter::is_in(schema.primary_key.clone(), keys.iter().map(PrimaryKey::to_json)));
        let items = self.fetch_items(&self.services.db, &query, opts, None).await?;
        self.emit_read(&query, items.len(), opts, false);
        Ok(items)
    }

    /// Keys selected by `query`. No limit means every match.
    #[instrument(skip(self, query), fields(collection = %self.collection))]
    pub async fn get_keys_by_query(&self, query: &Query) -> Result<Vec<PrimaryKey>, ServiceError> {
        self.keys_by_query(&self.services.db, query).await
    }

    /// As [`ItemsService::get_keys_by_query`], seeing the context's staged writes.
    pub async fn get_keys_by_query_in(&self, ctx: &MutationContext, query: &Query) -> Result<Vec<PrimaryKey>, ServiceError> {
        self.keys_by_query(ctx.txn(), query).await
    }

    async fn keys_by_query<C: ConnectionTrait>(&self, conn: &C, query: &Query) -> Result<Vec<PrimaryKey>, ServiceError> {
        let schema = self.schema()?;
        let access = self.access(PermissionAction::Read).await?;
        let key_query = Query { fields: Some(vec![schema.primary_key.clone()]), ..query.clone() };
        select_columns(&schema, &key_query, &access)?;
        let limit = match query.limit {
            Some(Limit::Count(n)) => Some(n),
            Some(Limit::Unlimited) | None => None,
        };
        let keys = sql::fetch_keys(conn, &schema, query, limit).await?;
        debug!(count = keys.len(), keys = %keys_json(&keys), "keys_resolved");
        Ok(keys)
    }
}
