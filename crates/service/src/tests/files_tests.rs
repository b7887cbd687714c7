use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use models::query::{Filter, Query};
use models::PrimaryKey;
use serde_json::json;

use super::item;
use crate::storage::{MemoryStorage, StorageRegistry};
use crate::test_support::{test_services, FailingStorage, StaticFetcher};
use crate::{FilesService, MutationOptions, QueryOptions, ServiceError};

async fn files_in_memory() -> Result<(FilesService, Arc<MemoryStorage>)> {
    let memory = Arc::new(MemoryStorage::new());
    let storage = StorageRegistry::new()
        .with("memory", memory.clone())
        .with("broken", Arc::new(FailingStorage));
    let fetcher = StaticFetcher::default()
        .with("https://cdn.example.com/logo.png", b"png-bytes", Some("image/png"))
        .with("https://cdn.example.com/export", b"a,b\n1,2\n", Some("text/csv"));
    let services = test_services().await?.with_storage(storage).with_fetcher(Arc::new(fetcher));
    Ok((FilesService::new(services), memory))
}

async fn file_record(files: &FilesService, key: &PrimaryKey) -> Result<models::Item> {
    Ok(files.items().read_one(key, &Query::new(), &QueryOptions::default()).await?)
}

#[tokio::test]
async fn upload_stores_bytes_and_record() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let key = files
        .upload_one(Cursor::new(b"png-bytes".to_vec()), item(json!({"storage": "memory", "filename": "x.png"})), None, &MutationOptions::new())
        .await?;

    let record = file_record(&files, &key).await?;
    let disk = format!("{key}.png");
    assert_eq!(record.get("filename_download"), Some(&json!("x.png")));
    assert_eq!(record.get("filename_disk"), Some(&json!(disk)));
    assert_eq!(record.get("type"), Some(&json!("image/png")));
    assert_eq!(record.get("title"), Some(&json!("x")));
    assert_eq!(record.get("filesize"), Some(&json!(9)));
    assert!(record.get("uploaded_on").and_then(|v| v.as_str()).is_some());
    assert_eq!(memory.get(&disk), Some(b"png-bytes".to_vec()));
    Ok(())
}

#[tokio::test]
async fn storage_failure_leaves_no_record() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let err = files
        .upload_one(Cursor::new(b"png-bytes".to_vec()), item(json!({"storage": "broken", "filename_download": "x.png"})), None, &MutationOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(_)));

    let rows = files
        .items()
        .read_by_query(&Query::new().filter(Filter::eq("filename_download", "x.png")), &QueryOptions::default())
        .await?;
    assert!(rows.is_empty());
    assert!(memory.is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_requires_a_known_location() -> Result<()> {
    let (files, _) = files_in_memory().await?;
    let err = files
        .upload_one(Cursor::new(Vec::new()), item(json!({"filename": "x.png"})), None, &MutationOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = files
        .upload_one(Cursor::new(Vec::new()), item(json!({"storage": "s3", "filename": "x.png"})), None, &MutationOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn replacing_swaps_the_stored_object() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let key = files
        .upload_one(Cursor::new(b"v1".to_vec()), item(json!({"storage": "memory", "filename": "report.txt"})), None, &MutationOptions::new())
        .await?;
    let old_disk = format!("{key}.txt");
    assert!(memory.get(&old_disk).is_some());

    let replaced = files
        .upload_one(Cursor::new(b"version 2".to_vec()), item(json!({"storage": "memory"})), Some(&key), &MutationOptions::new())
        .await?;
    assert_eq!(replaced, key);

    let record = file_record(&files, &key).await?;
    let new_disk = record.get("filename_disk").and_then(|v| v.as_str()).map(str::to_string);
    assert_ne!(new_disk.as_deref(), Some(old_disk.as_str()));
    assert_eq!(record.get("filename_download"), Some(&json!("report.txt")));
    assert_eq!(record.get("filesize"), Some(&json!(9)));
    assert!(memory.get(&old_disk).is_none());
    assert_eq!(memory.keys(), new_disk.into_iter().collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn replacing_a_missing_file_is_not_found() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let missing = PrimaryKey::from(uuid::Uuid::new_v4());
    let err = files
        .upload_one(Cursor::new(b"x".to_vec()), item(json!({"storage": "memory", "filename": "x.txt"})), Some(&missing), &MutationOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(memory.is_empty());
    Ok(())
}

#[tokio::test]
async fn import_downloads_into_default_location() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let key = files.import_one("https://cdn.example.com/logo.png", item(json!({})), &MutationOptions::new()).await?;

    let record = file_record(&files, &key).await?;
    assert_eq!(record.get("storage"), Some(&json!("memory")));
    assert_eq!(record.get("filename_download"), Some(&json!("logo.png")));
    assert_eq!(record.get("type"), Some(&json!("image/png")));
    assert_eq!(memory.get(&format!("{key}.png")), Some(b"png-bytes".to_vec()));
    Ok(())
}

#[tokio::test]
async fn import_names_files_from_the_content_type() -> Result<()> {
    let (files, _) = files_in_memory().await?;
    let key = files
        .import_one("https://cdn.example.com/export", item(json!({"title": "Quarterly"})), &MutationOptions::new())
        .await?;
    let record = file_record(&files, &key).await?;
    assert_eq!(record.get("filename_download"), Some(&json!("export.csv")));
    assert_eq!(record.get("title"), Some(&json!("Quarterly")));
    assert_eq!(record.get("type"), Some(&json!("text/csv")));
    Ok(())
}

#[tokio::test]
async fn import_failures_write_nothing() -> Result<()> {
    let (files, memory) = files_in_memory().await?;
    let err = files.import_one("ftp://cdn.example.com/logo.png", item(json!({})), &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = files.import_one("https://unreachable.example.com/a.png", item(json!({})), &MutationOptions::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Fetch(_)));

    assert!(files.items().get_keys_by_query(&Query::new()).await?.is_empty());
    assert!(memory.is_empty());
    Ok(())
}
