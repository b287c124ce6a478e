use std::{
  io,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dtmirror_core::{
  document::Document,
  fs::write_atomic,
  person::{PersonId, PersonRecord},
  store::{MirrorStore, StoreSummary},
};

use crate::{Error, Result};

const METADATA: &str = "metadata.json";

/// The only field the watermark scan reads from a person document.
#[derive(Deserialize)]
struct Stamp {
  time: DateTime<Utc>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mirror kept as a tree of JSON documents under `root`.
#[derive(Debug, Clone)]
pub struct TreeStore {
  root: PathBuf,
}

impl TreeStore {
  /// Open the tree at `root`, creating `people/` and `documents/` if needed.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
    let store = Self { root: root.into() };
    for dir in [store.people_dir(), store.documents_dir()] {
      tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::io(&dir, e))?;
    }
    tracing::debug!(root = %store.root.display(), "tree store opened");
    Ok(store)
  }

  pub fn root(&self) -> &Path { &self.root }

  fn people_dir(&self) -> PathBuf { self.root.join("people") }

  fn documents_dir(&self) -> PathBuf { self.root.join("documents") }

  /// Location of a person's JSON document.
  pub fn person_path(&self, id: PersonId) -> PathBuf {
    self.people_dir().join(id.to_string()).join(METADATA)
  }

  /// Location of a document's JSON file. Fails for names that are not a
  /// single plain path segment.
  pub fn document_path(&self, name: &str) -> Result<PathBuf> {
    if name.is_empty()
      || name == "."
      || name == ".."
      || name.contains(['/', '\\', ':'])
      || name.starts_with('.')
    {
      return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(self.documents_dir().join(name).join(METADATA))
  }

  /// Read back a stored person, or `None` if it was never written.
  pub async fn get_record(&self, id: PersonId) -> Result<Option<PersonRecord>> {
    read_json(&self.person_path(id)).await
  }

  #[cfg(test)]
  pub(crate) async fn get_document(&self, name: &str) -> Result<Option<Document>> {
    read_json(&self.document_path(name)?).await
  }
}

// ─── File helpers ────────────────────────────────────────────────────────────

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| Error::Json {
    path: path.to_owned(),
    source,
  })?;
  bytes.push(b'\n');
  write_atomic(path, &bytes)
    .await
    .map_err(|e| Error::io(path, e))
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
  let bytes = match tokio::fs::read(path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(Error::io(path, e)),
  };
  serde_json::from_slice(&bytes)
    .map(Some)
    .map_err(|source| Error::Json { path: path.to_owned(), source })
}

/// Every `<dir>/*/metadata.json` that exists. Subdirectories without one
/// (a person whose first write failed, say) are ignored.
async fn metadata_files(dir: &Path) -> Result<Vec<PathBuf>> {
  let mut entries = tokio::fs::read_dir(dir)
    .await
    .map_err(|e| Error::io(dir, e))?;

  let mut files = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
    let path = entry.path().join(METADATA);
    match tokio::fs::metadata(&path).await {
      Ok(meta) if meta.is_file() => files.push(path),
      Ok(_) => {}
      Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {}
      Err(e) => return Err(Error::io(path, e)),
    }
  }
  files.sort();
  Ok(files)
}

// ─── MirrorStore impl ────────────────────────────────────────────────────────

impl MirrorStore for TreeStore {
  type Error = Error;

  async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
    let mut newest = None;
    for path in metadata_files(&self.people_dir()).await? {
      if let Some(Stamp { time }) = read_json::<Stamp>(&path).await? {
        newest = newest.max(Some(time));
      }
    }
    Ok(newest)
  }

  async fn put_person(&self, record: &PersonRecord) -> Result<()> {
    write_json(&self.person_path(record.id()), record).await
  }

  async fn put_document(&self, document: &Document) -> Result<()> {
    write_json(&self.document_path(&document.name)?, document).await
  }

  async fn summary(&self) -> Result<StoreSummary> {
    Ok(StoreSummary {
      people:    metadata_files(&self.people_dir()).await?.len() as u64,
      documents: metadata_files(&self.documents_dir()).await?.len() as u64,
      watermark: self.watermark().await?,
    })
  }

  fn asset_dir(&self, person: PersonId) -> Option<PathBuf> {
    Some(self.people_dir().join(person.to_string()).join("media").join("photo"))
  }
}
