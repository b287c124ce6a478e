//! Filesystem helpers shared by the stores and the asset materializer.
//!
//! Files are never written in place: content goes to a sibling `.part` file
//! which is renamed over the destination once complete.

use std::{
  ffi::OsString,
  io,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt as _;

/// The staging path used while `path` is being written.
pub fn part_path(path: &Path) -> PathBuf {
  let mut staged = OsString::from(path.as_os_str());
  staged.push(".part");
  PathBuf::from(staged)
}

/// Write `contents` to `path` so that readers observe either the old file or
/// the complete new one. Parent directories are created as needed.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  let staged = part_path(path);
  let result: io::Result<()> = async {
    let mut file = tokio::fs::File::create(&staged).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&staged, path).await
  }
  .await;

  if result.is_err() {
    let _ = tokio::fs::remove_file(&staged).await;
  }
  result
}

/// Modification time of `path` in UTC, or `None` if there is no such file.
pub async fn modified_at(path: &Path) -> io::Result<Option<DateTime<Utc>>> {
  match tokio::fs::metadata(path).await {
    Ok(meta) => Ok(Some(meta.modified()?.into())),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn part_path_appends_suffix() {
    assert_eq!(part_path(Path::new("a/b/photo.jpg")), PathBuf::from("a/b/photo.jpg.part"));
    assert_eq!(part_path(Path::new("metadata.json")), PathBuf::from("metadata.json.part"));
  }

  #[tokio::test]
  async fn write_atomic_creates_parents_and_replaces() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("people/1/metadata.json");

    write_atomic(&path, b"first").await.unwrap();
    write_atomic(&path, b"second").await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    assert!(!part_path(&path).exists());
  }

  #[tokio::test]
  async fn modified_at_missing_is_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_eq!(modified_at(&dir.path().join("nope")).await.unwrap(), None);
  }
}
