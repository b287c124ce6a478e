//! Error types for `dtmirror-datatracker`.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} answered {status}")]
  Status { url: String, status: u16 },

  #[error("unexpected response from {url}: {source}")]
  Json {
    url:    String,
    #[source]
    source: serde_json::Error,
  },

  /// A related-object link that does not have the expected shape.
  #[error("expected a {kind} resource URI, got {uri:?}")]
  ResourceUri { kind: &'static str, uri: String },

  #[error("unparsable timestamp {0:?}")]
  Timestamp(String),

  #[error("unknown history type {0:?}")]
  HistoryType(String),

  #[error("response cache at {}: {source}", path.display())]
  Cache {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
