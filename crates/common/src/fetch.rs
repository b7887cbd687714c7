//! Remote file download used by file imports.

use reqwest::Url;
use tracing::debug;

use crate::CoreError;

/// Bytes downloaded from a remote URL plus what the response told us about them.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Last non-empty path segment of the final URL, if any.
    pub file_name: Option<String>,
}

/// Parse and check that `url` is an absolute http(s) URL.
pub fn parse_http_url(url: &str) -> Result<Url, CoreError> {
    let parsed = Url::parse(url).map_err(|e| CoreError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CoreError::InvalidUrl(format!("unsupported scheme `{other}`"))),
    }
}

/// Download `url` fully into memory.
pub async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<RemoteFile, CoreError> {
    let parsed = parse_http_url(url)?;
    let resp = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| CoreError::Network(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(CoreError::Status(status.as_u16()));
    }
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let file_name = file_name_from_url(resp.url());
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| CoreError::Network(e.to_string()))?
        .to_vec();
    debug!(%url, size = bytes.len(), "remote_file_fetched");
    Ok(RemoteFile { bytes, content_type, file_name })
}

fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
}
