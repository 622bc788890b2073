//! Error types for `tempora-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid interval: {0}")]
  InvalidInterval(String),

  #[error("not a revision key: {0:?}")]
  InvalidRevisionKey(String),

  #[error("invalid document id {0:?}: {1}")]
  InvalidDocumentId(String, &'static str),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
