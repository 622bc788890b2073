//! The per-request effective date.
//!
//! Taken from the `Temporal-Effective-Date` header, or failing that from the
//! `?effective=` query parameter. Both carry an RFC 3339 timestamp. Absence
//! means current semantics for point reads and as-stored semantics for
//! queries.

use axum::{
  extract::{FromRequestParts, Query},
  http::request::Parts,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;

pub const EFFECTIVE_DATE_HEADER: &str = "temporal-effective-date";

/// Extractor for the request's effective date, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectiveDate(pub Option<DateTime<Utc>>);

#[derive(Debug, Deserialize)]
struct EffectiveParam {
  effective: Option<DateTime<Utc>>,
}

fn parse(raw: &str) -> Result<DateTime<Utc>, ApiError> {
  DateTime::parse_from_rfc3339(raw.trim())
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| ApiError::BadRequest(format!("invalid effective date {raw:?}: {e}")))
}

impl<S: Send + Sync> FromRequestParts<S> for EffectiveDate {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    if let Some(value) = parts.headers.get(EFFECTIVE_DATE_HEADER) {
      let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("effective date header is not ASCII".into()))?;
      return Ok(Self(Some(parse(raw)?)));
    }

    let Query(param) = Query::<EffectiveParam>::try_from_uri(&parts.uri)
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Self(param.effective))
  }
}
