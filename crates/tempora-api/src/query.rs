//! `POST /query`. Body: [`DocumentQuery`]; results pass through the
//! read-path filter at the request's [`EffectiveDate`].

use std::sync::Arc;

use axum::{Json, extract::State};
use tempora_core::{
  document::Document,
  store::{DocumentQuery, DocumentStore},
};
use tempora_engine::TemporalEngine;

use crate::{effective::EffectiveDate, error::ApiError};

pub async fn handler<S: DocumentStore + 'static>(
  State(engine): State<Arc<TemporalEngine<S>>>,
  EffectiveDate(effective): EffectiveDate,
  Json(query): Json<DocumentQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
  Ok(Json(engine.query(&query, effective).await?))
}
