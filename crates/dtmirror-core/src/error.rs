//! Error types for `dtmirror-core`.

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::person::PersonId;

/// Boxed error from a backend (record source or store) whose concrete type
/// the sync loop does not know.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The natural key of a mirrored record, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
  Person(PersonId),
  Document(String),
}

impl fmt::Display for RecordKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Person(id) => write!(f, "person {id}"),
      Self::Document(name) => write!(f, "document {name}"),
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// The local store could not report its newest timestamp. Never treated
  /// as "empty store".
  #[error("could not read the local watermark: {0}")]
  Watermark(#[source] BoxError),

  /// A top-level listing could not be fetched.
  #[error("record source failed: {0}")]
  Source(#[source] BoxError),

  #[error("did not gather {key}: {source}")]
  Gather {
    key:    RecordKey,
    #[source]
    source: BoxError,
  },

  #[error("did not persist {key}: {source}")]
  Persist {
    key:    RecordKey,
    #[source]
    source: BoxError,
  },

  #[error("{kind} of person {expected} references person {found}")]
  BrokenLink {
    kind:     &'static str,
    expected: PersonId,
    found:    PersonId,
  },

  #[error(transparent)]
  Malformed(#[from] Malformed),

  #[error(transparent)]
  Fetch(#[from] FetchError),
}

impl Error {
  pub fn source_error(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Source(Box::new(e))
  }

  pub fn persist(key: RecordKey, e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Persist { key, source: Box::new(e) }
  }

  pub fn gather(key: RecordKey, e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Gather { key, source: Box::new(e) }
  }
}

/// An object in a listing that the source could not translate. Only that
/// object is lost; the rest of its page is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {key}: {reason}")]
pub struct Malformed {
  /// What the object is, as far as it could be read (`person 3`,
  /// `document draft-foo`, `alias #2`).
  pub key:    String,
  pub reason: String,
}

/// Failure to probe or download a remote asset.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request to {uri} failed: {source}")]
  Transport {
    uri:    String,
    #[source]
    source: BoxError,
  },

  #[error("{uri} answered {status}")]
  Status { uri: String, status: u16 },

  #[error("{uri} sent no Last-Modified header")]
  MissingLastModified { uri: String },

  #[error("{uri} sent an unparsable Last-Modified header: {value:?}")]
  InvalidLastModified { uri: String, value: String },

  #[error("cannot derive a file name from {0:?}")]
  InvalidUri(String),

  #[error("i/o error on {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl FetchError {
  pub fn transport(
    uri: impl Into<String>,
    e: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Transport { uri: uri.into(), source: Box::new(e) }
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io { path: path.into(), source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
