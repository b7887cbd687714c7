use models::schema::CollectionSchema;
use models::{revision, Item, PrimaryKey};
use sea_orm::{ActiveModelTrait, ConnectionTrait, NotSet, Set};
use tracing::trace;

use super::{MutationOptions, RevisionCallback};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionAction {
    Create,
    Update,
    Delete,
}

impl RevisionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Writes change records for one call and notifies its revision callback.
pub struct RevisionRecorder<'a> {
    schema: &'a CollectionSchema,
    callback: Option<&'a RevisionCallback>,
}

impl<'a> RevisionRecorder<'a> {
    pub fn new(schema: &'a CollectionSchema, opts: &'a MutationOptions) -> Self {
        Self { schema, callback: opts.on_revision_create.as_ref() }
    }

    /// Whether `record` writes a row (callers skip loading `data` otherwise).
    pub fn tracks(&self) -> bool { self.schema.track_revisions }

    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        action: RevisionAction,
        key: &PrimaryKey,
        data: Option<&Item>,
        delta: Option<&Item>,
    ) -> Result<(), ServiceError> {
        if self.schema.track_revisions {
            let row = revision::ActiveModel {
                id: NotSet,
                action: Set(action.as_str().to_string()),
                collection: Set(self.schema.name.clone()),
                item: Set(key.to_string()),
                data: Set(data.map(to_json_text).transpose()?),
                delta: Set(delta.map(to_json_text).transpose()?),
                created_at: Set(chrono::Utc::now().to_rfc3339()),
            };
            row.insert(conn).await?;
            trace!(collection = %self.schema.name, item = %key, action = action.as_str(), "revision_recorded");
        }
        if let Some(callback) = self.callback {
            callback(key);
        }
        Ok(())
    }
}

fn to_json_text(item: &Item) -> Result<String, ServiceError> {
    serde_json::to_string(item).map_err(|e| ServiceError::Db(format!("revision payload: {e}")))
}
