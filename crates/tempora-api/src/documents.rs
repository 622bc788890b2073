//! Handlers for `/docs` endpoints.
//!
//! | Method   | Path          | Notes |
//! |----------|---------------|-------|
//! | `PUT`    | `/docs/{*id}` | Body: [`SaveBody`]; asserts a new revision |
//! | `GET`    | `/docs/{*id}` | Point read at the request's effective date |
//! | `DELETE` | `/docs/{*id}` | Soft delete from the request's effective date |
//!
//! Every endpoint honours [`EffectiveDate`].

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Deserialize;
use serde_json::Value;
use tempora_core::{document::Document, metadata::Metadata, store::DocumentStore};
use tempora_engine::{NewDocument, SaveOutcome, TemporalEngine};

use crate::{effective::EffectiveDate, error::ApiError};

/// JSON body accepted by `PUT /docs/{*id}`.
#[derive(Debug, Deserialize)]
pub struct SaveBody {
  pub content:  Value,
  #[serde(default)]
  pub metadata: Metadata,
}

/// `PUT /docs/{*id}`
pub async fn save<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path(id): Path<String>,
  EffectiveDate(effective): EffectiveDate,
  Json(body): Json<SaveBody>,
) -> Result<Json<SaveOutcome>, ApiError> {
  let mut document = NewDocument::new(body.content).with_metadata(body.metadata);
  if let Some(at) = effective {
    document = document.effective_at(at);
  }
  Ok(Json(engine.save(&id, document).await?))
}

/// `GET /docs/{*id}`
pub async fn load<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path(id): Path<String>,
  EffectiveDate(effective): EffectiveDate,
) -> Result<Json<Document>, ApiError> {
  let document = engine
    .load(&id, effective)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("{id} not found")))?;
  Ok(Json(document))
}

/// `DELETE /docs/{*id}`
pub async fn delete<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  Path(id): Path<String>,
  EffectiveDate(effective): EffectiveDate,
) -> Result<Json<SaveOutcome>, ApiError> {
  Ok(Json(engine.delete(&id, effective).await?))
}
