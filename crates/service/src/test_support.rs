#![cfg(test)]
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::fetch::RemoteFile;
use migration::MigratorTrait;
use models::schema::{CollectionSchema, FieldSchema, FieldType};
use models::{role, user};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tokio::io::AsyncRead;

use crate::cache::CacheStore;
use crate::context::ServiceContext;
use crate::errors::ServiceError;
use crate::fetch::RemoteFetcher;
use crate::schema::SchemaOverview;
use crate::storage::{StorageAdapter, StoredObject};

const USER_TABLES: &[&str] = &[
    "CREATE TABLE articles (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, status TEXT NOT NULL DEFAULT 'draft', rating INTEGER)",
    "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE settings (id INTEGER PRIMARY KEY AUTOINCREMENT, site_name TEXT, theme TEXT)",
];

/// Fresh in-memory database with the system tables migrated and the test
/// collections created. One connection, so every test gets its own database.
pub async fn get_db() -> Result<DatabaseConnection, anyhow::Error> {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let db = Database::connect(opts).await?;
    migration::Migrator::up(&db, None).await?;
    for ddl in USER_TABLES {
        db.execute_unprepared(ddl).await?;
    }
    Ok(db)
}

pub fn articles_schema() -> CollectionSchema {
    CollectionSchema::new("articles", "id")
        .field(FieldSchema::new("id", FieldType::Integer).auto_increment())
        .field(FieldSchema::new("title", FieldType::String).required())
        .field(FieldSchema::new("status", FieldType::String).required().default_value("draft"))
        .field(FieldSchema::new("rating", FieldType::Integer))
        .track_revisions()
}

pub fn tags_schema() -> CollectionSchema {
    CollectionSchema::new("tags", "id")
        .field(FieldSchema::new("id", FieldType::Integer).required())
        .field(FieldSchema::new("name", FieldType::String).required())
        .track_revisions()
}

pub fn settings_schema() -> CollectionSchema {
    CollectionSchema::new("settings", "id")
        .field(FieldSchema::new("id", FieldType::Integer).auto_increment())
        .field(FieldSchema::new("site_name", FieldType::String).default_value("My Site"))
        .field(FieldSchema::new("theme", FieldType::String))
        .singleton()
}

pub fn test_schema() -> SchemaOverview {
    let mut overview = SchemaOverview::with_system_collections();
    for schema in [articles_schema(), tags_schema(), settings_schema()] {
        overview.insert(schema).expect("test schema is valid");
    }
    overview
}

pub async fn test_services() -> Result<ServiceContext, anyhow::Error> {
    let db = get_db().await?;
    Ok(ServiceContext::new(db, Arc::new(test_schema())))
}

/// An administrator role with one active user. Returns the user id.
pub async fn seed_admin(db: &DatabaseConnection) -> Result<String, anyhow::Error> {
    let admin = role::create(db, "Administrator", true, true).await?;
    let user = user::create(db, "admin@example.com", Some(&admin.id)).await?;
    Ok(user.id)
}

/// Remembers purge calls.
#[derive(Default)]
pub struct RecordingCache {
    purged: Mutex<Vec<String>>,
    system: Mutex<usize>,
}

impl RecordingCache {
    pub fn purged(&self) -> Vec<String> { self.purged.lock().unwrap().clone() }

    pub fn system_purges(&self) -> usize { *self.system.lock().unwrap() }
}

impl CacheStore for RecordingCache {
    fn purge(&self, collection: &str) { self.purged.lock().unwrap().push(collection.to_string()); }

    fn purge_system(&self) { *self.system.lock().unwrap() += 1; }
}

/// Rejects every write.
#[derive(Default)]
pub struct FailingStorage;

#[async_trait]
impl StorageAdapter for FailingStorage {
    async fn write(&self, key: &str, _: &mut (dyn AsyncRead + Send + Unpin)) -> Result<StoredObject, ServiceError> {
        Err(ServiceError::Storage(format!("disk full while writing {key}")))
    }

    async fn delete(&self, _: &str) -> Result<(), ServiceError> { Ok(()) }

    async fn exists(&self, _: &str) -> Result<bool, ServiceError> { Ok(false) }
}

/// Serves canned responses by URL; anything else fails like an unreachable host.
#[derive(Default)]
pub struct StaticFetcher {
    files: HashMap<String, RemoteFile>,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
        let file_name = url.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string);
        self.files.insert(
            url.to_string(),
            RemoteFile { bytes: bytes.to_vec(), content_type: content_type.map(str::to_string), file_name },
        );
        self
    }
}

#[async_trait]
impl RemoteFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<RemoteFile, ServiceError> {
        common::fetch::parse_http_url(url)?;
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::Fetch(format!("could not reach {url}")))
    }
}
