//! Error type for `tempora-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tempora_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored column held something other than a JSON object where one was
  /// required.
  #[error("record {key}: {column} is not a JSON object")]
  NotAnObject { key: String, column: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
