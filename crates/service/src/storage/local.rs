use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

use super::{check_key, StorageAdapter, StoredObject};
use crate::errors::ServiceError;

/// Files under a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &PathBuf { &self.root }

    fn path(&self, key: &str) -> Result<PathBuf, ServiceError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

fn storage_err(e: std::io::Error) -> ServiceError { ServiceError::Storage(e.to_string()) }

#[async_trait]
impl StorageAdapter for LocalStorage {
    async fn write(&self, key: &str, stream: &mut (dyn AsyncRead + Send + Unpin)) -> Result<StoredObject, ServiceError> {
        let path = self.path(key)?;
        fs::create_dir_all(&self.root).await.map_err(storage_err)?;
        let mut file = fs::File::create(&path).await.map_err(storage_err)?;
        let copied = match tokio::io::copy(stream, &mut file).await {
            Ok(n) => file.flush().await.map(|_| n),
            Err(e) => Err(e),
        };
        match copied {
            Ok(size) => {
                debug!(key, size, "local_object_written");
                Ok(StoredObject { key: key.to_string(), size })
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(key, error = %rm, "local_partial_object_not_removed");
                }
                Err(storage_err(e))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ServiceError> {
        let path = self.path(key)?;
        fs::try_exists(&path).await.map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("items-local-storage-{}", uuid::Uuid::new_v4()))
    }

    /// Yields some bytes, then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(mut self: Pin<&mut Self>, _: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset")));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_exists_delete() -> Result<(), anyhow::Error> {
        let storage = LocalStorage::new(temp_root());
        let mut body: &[u8] = b"hello";
        let stored = storage.write("a.txt", &mut body).await?;
        assert_eq!(stored.size, 5);
        assert!(storage.exists("a.txt").await?);
        assert_eq!(fs::read(storage.root().join("a.txt")).await?, b"hello");

        storage.delete("a.txt").await?;
        assert!(!storage.exists("a.txt").await?);
        // deleting twice is fine
        storage.delete("a.txt").await?;
        fs::remove_dir_all(storage.root()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing() -> Result<(), anyhow::Error> {
        let storage = LocalStorage::new(temp_root());
        let mut reader = BrokenReader { sent: false };
        let err = storage.write("b.bin", &mut reader).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert!(!storage.exists("b.bin").await?);
        fs::remove_dir_all(storage.root()).await?;
        Ok(())
    }
}
