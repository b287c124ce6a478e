//! The `MirrorStore` trait: the local side of the mirror.
//!
//! Implemented by `dtmirror-store-sqlite` (relational rows) and
//! `dtmirror-store-tree` (a JSON document tree with media files). The sync
//! loop only sees this abstraction.

use std::{future::Future, path::PathBuf};

use chrono::{DateTime, Utc};

use crate::{
  document::Document,
  person::{PersonId, PersonRecord},
};

/// Counts reported by `dtmirror status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
  pub people:    u64,
  pub documents: u64,
  pub watermark: Option<DateTime<Utc>>,
}

/// A local, exclusively owned destination for mirrored records.
///
/// Every write is an insert-or-replace on the record's natural key, so
/// writing the same record twice is indistinguishable from writing it once.
/// Each call is atomic: either the whole record becomes visible or none of
/// it does.
pub trait MirrorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The newest `Person::time` currently stored, or `None` when no person
  /// has been stored yet.
  fn watermark(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  /// Replace the person and all of its child collections.
  fn put_person<'a>(
    &'a self,
    record: &'a PersonRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace a document, keyed by its name.
  fn put_document<'a>(
    &'a self,
    document: &'a Document,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn summary(&self) -> impl Future<Output = Result<StoreSummary, Self::Error>> + Send + '_;

  /// Directory holding a person's photo assets, if this store keeps binary
  /// assets at all.
  fn asset_dir(&self, _person: PersonId) -> Option<PathBuf> { None }
}
