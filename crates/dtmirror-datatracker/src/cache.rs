//! On-disk cache of listing responses, keyed by request URL.
//!
//! Speeds up repeated development runs against the live API. Entries are
//! whole response bodies stored under the SHA-256 of the URL; an entry
//! older than the TTL is treated as absent and overwritten on the next
//! fetch.

use std::{
  io,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use sha2::{Digest, Sha256};

use dtmirror_core::fs::write_atomic;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DiskCache {
  dir: PathBuf,
  ttl: Duration,
}

impl DiskCache {
  pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self { Self { dir: dir.into(), ttl } }

  pub fn dir(&self) -> &Path { &self.dir }

  fn entry_path(&self, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    self.dir.join(format!("{}.json", hex::encode(digest)))
  }

  /// The cached body for `url`, if present and younger than the TTL.
  pub async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
    let path = self.entry_path(url);
    let cache_err = |source| Error::Cache { path: path.clone(), source };

    let meta = match tokio::fs::metadata(&path).await {
      Ok(meta) => meta,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(cache_err(e)),
    };
    let written = meta.modified().map_err(cache_err)?;
    // A timestamp in the future counts as fresh.
    let age = SystemTime::now().duration_since(written).unwrap_or_default();
    if age > self.ttl {
      tracing::debug!(url, "cache entry expired");
      return Ok(None);
    }

    let body = tokio::fs::read(&path).await.map_err(cache_err)?;
    tracing::debug!(url, "cache hit");
    Ok(Some(body))
  }

  pub async fn put(&self, url: &str, body: &[u8]) -> Result<()> {
    let path = self.entry_path(url);
    write_atomic(&path, body)
      .await
      .map_err(|source| Error::Cache { path, source })
  }
}
