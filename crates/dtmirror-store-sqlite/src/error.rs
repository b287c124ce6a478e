//! Error type for `dtmirror-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown history type: {0:?}")]
  UnknownHistoryType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
