//! Handlers for revision and history endpoints.
//!
//! | Method | Path                       | Notes |
//! |--------|----------------------------|-------|
//! | `GET`  | `/revisions/{*id}`         | `?offset=&count=`; ascending revision number |
//! | `GET`  | `/revision/{number}/{*id}` | One revision, artifacts included |
//! | `GET`  | `/history/{*id}`           | Temporal metadata of every revision |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use tempora_core::{document::Document, store::DocumentStore};
use tempora_engine::{TemporalEngine, TemporalHistory};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PageParams {
  #[serde(default)]
  pub offset: usize,
  pub count:  Option<usize>,
}

/// `GET /revisions/{*id}[?offset=..][&count=..]`
pub async fn list<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path(id): Path<String>,
  Query(page): Query<PageParams>,
) -> Result<Json<Vec<Document>>, ApiError> {
  Ok(Json(engine.list_revisions(&id, page.offset, page.count).await?))
}

/// `GET /revision/{number}/{*id}`
pub async fn get_one<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path((number, id)): Path<(u32, String)>,
) -> Result<Json<Document>, ApiError> {
  let document = engine
    .get_revision(&id, number)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("revision {number} of {id} not found")))?;
  Ok(Json(document))
}

/// `GET /history/{*id}`
pub async fn history<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path(id): Path<String>,
) -> Result<Json<TemporalHistory>, ApiError> {
  Ok(Json(engine.get_history(&id).await?))
}
