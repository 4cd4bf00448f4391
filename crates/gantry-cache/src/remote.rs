//! Remote cache over a plain HTTP content-addressed store
//!
//! The remote side is a blob store keyed by fingerprint:
//!   HEAD /cas/<hash>   existence probe
//!   GET  /cas/<hash>   download archive bytes
//!   PUT  /cas/<hash>   upload archive bytes
//!
//! Transfers optionally apply gzip on top of the stored bytes, controlled
//! by workspace configuration.

use std::io::{Read, Write};
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use gantry_core::config::{CompressionKind, RemoteCacheConfig};
use gantry_hash::Fingerprint;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{CacheError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for a remote content-addressed cache
#[derive(Debug, Clone)]
pub struct RemoteCache {
    client: reqwest::Client,
    base_url: String,
    compression: CompressionKind,
}

impl RemoteCache {
    /// Build a client from workspace configuration
    pub fn from_config(config: &RemoteCacheConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            compression: config.compression,
        })
    }

    fn blob_url(&self, hash: &Fingerprint) -> String {
        format!("{}/cas/{}", self.base_url, hash)
    }

    /// Probe whether the remote holds an archive for the hash
    pub async fn exists(&self, hash: &Fingerprint) -> Result<bool> {
        let response = self
            .client
            .head(self.blob_url(hash))
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Download archive bytes for the hash. Returns `None` on a miss.
    pub async fn download(&self, hash: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.blob_url(hash))
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CacheError::Remote(format!(
                "download of {} failed with status {}",
                hash.short(),
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        let bytes = match self.compression {
            CompressionKind::None => body.to_vec(),
            CompressionKind::Gzip => gunzip(&body)?,
        };

        debug!(hash = %hash.short(), size = bytes.len(), "downloaded remote cache entry");
        Ok(Some(bytes))
    }

    /// Upload archive bytes for the hash
    pub async fn upload(&self, hash: &Fingerprint, bytes: &[u8]) -> Result<()> {
        let body = match self.compression {
            CompressionKind::None => bytes.to_vec(),
            CompressionKind::Gzip => gzip(bytes)?,
        };

        let response = self
            .client
            .put(self.blob_url(hash))
            .body(body)
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError::Remote(format!(
                "upload of {} failed with status {}",
                hash.short(),
                response.status()
            )));
        }

        debug!(hash = %hash.short(), "uploaded remote cache entry");
        Ok(())
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_roundtrip() {
        let data = b"archive bytes".to_vec();
        let compressed = gzip(&data).unwrap();
        assert_ne!(compressed, data);
        assert_eq!(gunzip(&compressed).unwrap(), data);
    }

    #[test]
    fn test_blob_url_strips_trailing_slash() {
        let config = RemoteCacheConfig {
            url: "https://cache.example.com/".to_string(),
            compression: CompressionKind::Gzip,
        };
        let remote = RemoteCache::from_config(&config).unwrap();
        assert_eq!(
            remote.blob_url(&Fingerprint("abc123".to_string())),
            "https://cache.example.com/cas/abc123"
        );
    }
}
