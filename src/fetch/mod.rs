//! Retrieval of raw GTFS-RT feed bytes over HTTP or from disk.

mod basic;
mod client;
pub mod auth;

pub use auth::UrlParam;
pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// GETs `url` through `client`, failing on any non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("Request failed with status {status}");
    }

    Ok(resp.bytes().await?.to_vec())
}

/// Loads a feed from a local path, or fetches it when `source` is a URL.
///
/// `api_key`, when set, is sent as Transitland's `apikey` query parameter.
#[tracing::instrument(skip(api_key), fields(authenticated = api_key.is_some()))]
pub async fn load_source(source: &str, api_key: Option<&str>) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = BasicClient::new()?;
        let fetched = match api_key {
            Some(key) => fetch_bytes(&UrlParam::transitland(client, key.to_string()), source).await,
            None => fetch_bytes(&client, source).await,
        };
        fetched.with_context(|| format!("failed to fetch feed from {source}"))?
    } else {
        std::fs::read(source).with_context(|| format!("failed to read feed file {source}"))?
    };
    debug!(bytes = bytes.len(), "Feed loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_source_reads_local_file() {
        let path = std::env::temp_dir().join("gtfs_rt_stream_test_feed.pb");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let bytes = load_source(path.to_str().unwrap(), None).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_source_missing_file_is_error() {
        let err = load_source("/nonexistent/feed.pb", None).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/feed.pb"));
    }
}
