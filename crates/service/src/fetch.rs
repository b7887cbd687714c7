//! Remote download boundary used by file imports.

use std::time::Duration;

use async_trait::async_trait;
use common::fetch::{fetch_bytes, RemoteFile};

use crate::errors::ServiceError;

#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Download `url` in full. Invalid URLs are `Validation`, transport and status failures `Fetch`.
    async fn fetch(&self, url: &str) -> Result<RemoteFile, ServiceError>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self { Self { client } }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self { Self::new(reqwest::Client::new()) }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RemoteFile, ServiceError> {
        Ok(fetch_bytes(&self.client, url).await?)
    }
}
