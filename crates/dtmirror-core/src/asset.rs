//! Conditional materialisation of binary assets (photos).
//!
//! An asset is downloaded only when there is no local copy or the remote
//! `Last-Modified` is strictly newer than the local file's mtime. This is a
//! freshness heuristic: a change to the remote between the probe and the
//! download is not detected.

use std::{future::Future, path::Path};

use chrono::{DateTime, Utc};

use crate::{FetchError, fs};

/// What [`materialize_if_stale`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
  /// The local copy is at least as new as the remote one.
  Skipped,
  /// The asset was (re-)downloaded; `bytes` is the new file's size.
  Downloaded { bytes: u64 },
}

/// Transport used to probe and download assets.
pub trait AssetFetcher: Send + Sync {
  /// Metadata-only probe returning the remote `Last-Modified` instant.
  ///
  /// Must fail rather than guess when the header is absent or malformed.
  fn last_modified<'a>(
    &'a self,
    uri: &'a str,
  ) -> impl Future<Output = Result<DateTime<Utc>, FetchError>> + Send + 'a;

  /// Stream the full body of `uri` into `out`, returning the byte count.
  fn fetch_into<'a>(
    &'a self,
    uri: &'a str,
    out: &'a mut tokio::fs::File,
  ) -> impl Future<Output = Result<u64, FetchError>> + Send + 'a;
}

/// The local file name for an asset: the last path segment of its URI.
pub fn asset_file_name(uri: &str) -> Result<&str, FetchError> {
  let path = uri.split(['?', '#']).next().unwrap_or_default();
  let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

  if name.is_empty() || name == "." || name == ".." || name.contains('\\') || name.contains(':') {
    return Err(FetchError::InvalidUri(uri.to_owned()));
  }
  Ok(name)
}

/// Download `uri` to `local` unless the local copy is already current.
///
/// A missing local file always triggers a download. The new content is
/// staged next to `local` and only renamed into place once complete, so an
/// interrupted transfer leaves any previous copy untouched.
pub async fn materialize_if_stale<F: AssetFetcher>(
  fetcher: &F,
  uri: &str,
  local: &Path,
) -> Result<MaterializeOutcome, FetchError> {
  let remote = fetcher.last_modified(uri).await?;
  let current = fs::modified_at(local)
    .await
    .map_err(|e| FetchError::io(local, e))?;

  if let Some(current) = current
    && current >= remote
  {
    tracing::debug!(uri, path = %local.display(), "asset is current");
    return Ok(MaterializeOutcome::Skipped);
  }

  let bytes = download(fetcher, uri, local).await?;
  tracing::debug!(uri, path = %local.display(), bytes, "asset downloaded");
  Ok(MaterializeOutcome::Downloaded { bytes })
}

async fn download<F: AssetFetcher>(
  fetcher: &F,
  uri: &str,
  local: &Path,
) -> Result<u64, FetchError> {
  if let Some(parent) = local.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| FetchError::io(parent, e))?;
  }

  let staged = fs::part_path(local);
  let result: Result<u64, FetchError> = async {
    let mut file = tokio::fs::File::create(&staged)
      .await
      .map_err(|e| FetchError::io(&staged, e))?;
    let bytes = fetcher.fetch_into(uri, &mut file).await?;
    file.sync_all().await.map_err(|e| FetchError::io(&staged, e))?;
    drop(file);
    tokio::fs::rename(&staged, local)
      .await
      .map_err(|e| FetchError::io(local, e))?;
    Ok(bytes)
  }
  .await;

  if result.is_err() {
    let _ = tokio::fs::remove_file(&staged).await;
  }
  result
}
