//! Error type for `tempora-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// No visible revision for the requested id and date. Point reads report
  /// this as `Ok(None)`; only operations that need an existing document
  /// return it.
  #[error("not found: {0}")]
  NotFound(String),

  /// The backing store failed, or a record changed underneath a write that
  /// held the document lock.
  #[error("storage fault: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("invalid interval: {0}")]
  InvalidInterval(String),

  /// Another writer or the activation scheduler holds the document.
  #[error("document {0} is locked by a concurrent write")]
  Conflict(String),

  #[error("core error: {0}")]
  Core(tempora_core::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn storage<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(e))
  }

  pub(crate) fn concurrent_modification(key: &str) -> Self {
    Self::Storage(format!("record {key} changed while the document was locked").into())
  }
}

impl From<tempora_core::Error> for Error {
  fn from(e: tempora_core::Error) -> Self {
    match e {
      tempora_core::Error::InvalidInterval(msg) => Self::InvalidInterval(msg),
      other => Self::Core(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
