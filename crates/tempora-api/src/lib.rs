//! JSON REST API for Tempora.
//!
//! Exposes an axum [`Router`] over a [`TemporalEngine`] backed by any
//! [`tempora_core::store::DocumentStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tempora_api::api_router(engine.clone()))
//! ```

pub mod documents;
pub mod effective;
pub mod error;
pub mod query;
pub mod revisions;


use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tempora_core::store::DocumentStore;
use tempora_engine::TemporalEngine;

pub use effective::{EFFECTIVE_DATE_HEADER, EffectiveDate};
pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<TemporalEngine<S>>) -> Router<()>
where
  S: DocumentStore + 'static,
{
  Router::new()
    // Documents
    .route(
      "/docs/{*id}",
      get(documents::load::<S>)
        .put(documents::save::<S>)
        .delete(documents::delete::<S>),
    )
    // Revisions
    .route("/revisions/{*id}", get(revisions::list::<S>))
    .route("/revision/{number}/{*id}", get(revisions::get_one::<S>))
    .route("/history/{*id}", get(revisions::history::<S>))
    // Query
    .route("/query", post(query::handler::<S>))
    .with_state(engine)
}
