use models::query::Query;
use models::{Item, PrimaryKey};
use tracing::instrument;

use super::{ItemsService, QueryOptions};
use crate::errors::ServiceError;
use crate::mutation::{MutationContext, MutationOptions};
use crate::payload;

impl ItemsService {
    /// The single item of a singleton collection. An empty collection reads
    /// as its field defaults.
    #[instrument(skip(self, query, opts), fields(collection = %self.collection))]
    pub async fn read_singleton(&self, query: &Query, opts: &QueryOptions) -> Result<Item, ServiceError> {
        let query = query.clone().limit(1);
        let mut items = self.read_by_query(&query, opts).await?;
        if let Some(item) = items.pop() {
            return Ok(item);
        }
        let schema = self.schema()?;
        let access = self.access(opts.permissions_action).await?;
        let mut item = payload::defaults(&schema, &access);
        if !query.selects_all_fields() {
            item.retain(|field, _| query.fields.iter().flatten().any(|f| f == field));
        }
        Ok(item)
    }

    /// Update the existing row, or create it.
    #[instrument(skip(self, data, opts), fields(collection = %self.collection))]
    pub async fn upsert_singleton(&self, data: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        let mut ctx = self.begin(opts).await?;
        let result = self.upsert_singleton_in(&mut ctx, data, opts).await;
        ctx.finish(&self.services, result).await
    }

    pub async fn upsert_singleton_in(
        &self,
        ctx: &mut MutationContext,
        mut data: Item,
        opts: &MutationOptions,
    ) -> Result<PrimaryKey, ServiceError> {
        ctx.begin_mutation(opts)?;
        let schema = self.schema()?;
        let existing = self.get_keys_by_query_in(ctx, &Query::new().limit(1)).await?;
        match existing.into_iter().next() {
            Some(key) => {
                // the payload may carry a stale key; the existing row wins
                data.remove(&schema.primary_key);
                self.update_one_in(ctx, &key, data, opts).await
            }
            None => self.create_one_in(ctx, data, opts).await,
        }
    }
}
