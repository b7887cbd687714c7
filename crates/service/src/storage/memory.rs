use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{check_key, StorageAdapter, StoredObject};
use crate::errors::ServiceError;

/// Objects held in memory. Clones share contents.
///
/// ```
/// use service::storage::{MemoryStorage, StorageAdapter};
/// let storage = MemoryStorage::new();
/// let mut body: &[u8] = b"abc";
/// let stored = tokio_test::block_on(storage.write("x.txt", &mut body)).unwrap();
/// assert_eq!(stored.size, 3);
/// assert_eq!(storage.get("x.txt").unwrap(), b"abc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> { self.objects.get(key).map(|v| v.clone()) }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize { self.objects.len() }

    pub fn is_empty(&self) -> bool { self.objects.is_empty() }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn write(&self, key: &str, stream: &mut (dyn AsyncRead + Send + Unpin)) -> Result<StoredObject, ServiceError> {
        check_key(key)?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.map_err(|e| ServiceError::Storage(e.to_string()))?;
        let size = buf.len() as u64;
        self.objects.insert(key.to_string(), buf);
        Ok(StoredObject { key: key.to_string(), size })
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ServiceError> { Ok(self.objects.contains_key(key)) }
}
