//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("engine error: {0}")]
  Engine(#[source] tempora_engine::Error),
}

impl From<tempora_engine::Error> for ApiError {
  fn from(e: tempora_engine::Error) -> Self {
    use tempora_engine::Error as E;
    match e {
      E::NotFound(id) => Self::NotFound(format!("{id} not found")),
      E::Conflict(id) => Self::Conflict(format!("{id} is being written; retry")),
      E::InvalidInterval(msg) => Self::BadRequest(msg),
      E::Core(
        core @ (tempora_core::Error::InvalidDocumentId(..)
        | tempora_core::Error::InvalidRevisionKey(_)),
      ) => Self::BadRequest(core.to_string()),
      other => Self::Engine(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Engine(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
