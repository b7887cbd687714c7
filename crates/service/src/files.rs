//! File records plus their stored contents.

use std::io::Cursor;
use std::path::Path;

use models::schema::FILES_COLLECTION;
use models::{Item, PrimaryKey};
use serde_json::Value;
use tokio::io::AsyncRead;
use tracing::{info, instrument};

use crate::context::ServiceContext;
use crate::errors::ServiceError;
use crate::items::ItemsService;
use crate::mutation::{MutationContext, MutationOptions};
use crate::permissions::Accountability;
use crate::sql;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Extension to MIME type, most common first.
const MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("zip", "application/zip"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("md", "text/markdown"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    MIME_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, m)| *m)
        .unwrap_or(DEFAULT_MIME)
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    MIME_TYPES.iter().find(|(_, m)| m.eq_ignore_ascii_case(mime)).map(|(e, _)| *e)
}

fn disk_name(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn string_field<'a>(item: &'a Item, name: &str) -> Option<&'a str> { item.get(name).and_then(Value::as_str) }

/// `directus_files` plus upload and import.
#[derive(Clone)]
pub struct FilesService {
    items: ItemsService,
}

impl FilesService {
    pub fn new(services: ServiceContext) -> Self { Self { items: ItemsService::new(FILES_COLLECTION, services) } }

    pub fn with_accountability(mut self, accountability: Accountability) -> Self {
        self.items = self.items.with_accountability(accountability);
        self
    }

    /// Plain record access (read, update metadata, delete).
    pub fn items(&self) -> &ItemsService { &self.items }

    fn services(&self) -> &ServiceContext { self.items.services() }

    /// Store `stream` and create (or, with `key`, replace) its file record.
    ///
    /// `data` must name a registered `storage` location. `filename` is
    /// accepted for `filename_download`. If the stream cannot be stored the
    /// whole operation rolls back and no record is left behind.
    #[instrument(skip(self, stream, data, opts), fields(collection = FILES_COLLECTION))]
    pub async fn upload_one<R>(&self, mut stream: R, data: Item, key: Option<&PrimaryKey>, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let mut ctx = self.items.begin(opts).await?;
        let result = self.upload_one_in(&mut ctx, &mut stream, data, key, opts).await;
        ctx.finish(self.services(), result).await
    }

    pub async fn upload_one_in(
        &self,
        ctx: &mut MutationContext,
        stream: &mut (dyn AsyncRead + Send + Unpin),
        mut data: Item,
        key: Option<&PrimaryKey>,
        opts: &MutationOptions,
    ) -> Result<PrimaryKey, ServiceError> {
        let schema = self.items.schema()?;
        if let Some(name) = data.remove("filename") {
            data.entry("filename_download").or_insert(name);
        }

        let location = string_field(&data, "storage")
            .ok_or_else(|| ServiceError::Validation("file upload requires a `storage` location".into()))?
            .to_string();
        let adapter = self.services().storage.get(&location)?;

        let existing = match key {
            Some(key) => {
                let mut rows = sql::fetch_by_keys(ctx.txn(), &schema, std::slice::from_ref(key)).await?;
                Some(rows.pop().ok_or_else(|| ServiceError::not_found(&format!("file {key}")))?)
            }
            None => None,
        };

        let filename = string_field(&data, "filename_download")
            .or_else(|| existing.as_ref().and_then(|e| string_field(e, "filename_download")))
            .ok_or_else(|| ServiceError::Validation("file upload requires `filename_download`".into()))?
            .to_string();
        let ext = extension(&filename);
        if !data.contains_key("type") {
            let mime = ext.as_deref().map_or(DEFAULT_MIME, mime_for_extension);
            data.insert("type".into(), Value::from(mime));
        }

        let (key, disk) = match (key, &existing) {
            (Some(key), Some(existing)) => {
                let disk = disk_name(&uuid::Uuid::new_v4().to_string(), ext.as_deref());
                data.insert("filename_disk".into(), Value::from(disk.clone()));
                let key = self.items.update_one_in(ctx, key, data, opts).await?;
                let old_disk = string_field(existing, "filename_disk");
                let old_location = string_field(existing, "storage");
                if let (Some(old_disk), Some(old_location)) = (old_disk, old_location) {
                    if let Ok(old_adapter) = self.services().storage.get(old_location) {
                        ctx.track_superseded_object(old_adapter, old_disk.to_string());
                    }
                }
                (key, disk)
            }
            _ => {
                let id = match data.get(&schema.primary_key).and_then(PrimaryKey::from_json) {
                    Some(id) => id,
                    None => {
                        let id = PrimaryKey::from(uuid::Uuid::new_v4());
                        data.insert(schema.primary_key.clone(), id.to_json());
                        id
                    }
                };
                let disk = disk_name(&id.to_string(), ext.as_deref());
                data.insert("filename_disk".into(), Value::from(disk.clone()));
                if !data.contains_key("title") {
                    let stem = Path::new(&filename).file_stem().and_then(|s| s.to_str()).unwrap_or(filename.as_str());
                    data.insert("title".into(), Value::from(stem.to_string()));
                }
                data.entry("uploaded_on").or_insert_with(|| Value::from(chrono::Utc::now().to_rfc3339()));
                (self.items.create_one_in(ctx, data, opts).await?, disk)
            }
        };

        let stored = adapter.write(&disk, stream).await?;
        ctx.track_written_object(adapter, disk.clone());

        // filesize is bookkeeping and bypasses the pipeline
        let mut size = Item::new();
        size.insert("filesize".into(), Value::from(stored.size));
        sql::update(ctx.txn(), &schema, std::slice::from_ref(&key), &size).await?;

        info!(key = %key, storage = %location, disk = %disk, size = stored.size, "file_uploaded");
        Ok(key)
    }

    /// Download `url` and store it as a new file. Body fields override what the
    /// download reports; `storage` defaults to the registry's default location.
    #[instrument(skip(self, body, opts), fields(collection = FILES_COLLECTION, url = %url))]
    pub async fn import_one(&self, url: &str, mut body: Item, opts: &MutationOptions) -> Result<PrimaryKey, ServiceError> {
        common::fetch::parse_http_url(url)?;

        let location = match string_field(&body, "storage") {
            Some(location) => location.to_string(),
            None => self
                .services()
                .storage
                .default_location()
                .ok_or_else(|| ServiceError::Validation("no storage location configured".into()))?
                .to_string(),
        };
        self.services().storage.get(&location)?;
        body.insert("storage".into(), Value::from(location));

        let remote = self.services().fetcher.fetch(url).await?;

        if !body.contains_key("filename_download") && !body.contains_key("filename") {
            let mut name = remote.file_name.clone().unwrap_or_else(|| "download".to_string());
            if extension(&name).is_none() {
                if let Some(ext) = remote.content_type.as_deref().and_then(extension_for_mime) {
                    name = format!("{name}.{ext}");
                }
            }
            body.insert("filename_download".into(), Value::from(name));
        }
        if !body.contains_key("type") {
            if let Some(content_type) = &remote.content_type {
                body.insert("type".into(), Value::from(content_type.clone()));
            }
        }

        self.upload_one(Cursor::new(remote.bytes), body, None, opts).await
    }
}
