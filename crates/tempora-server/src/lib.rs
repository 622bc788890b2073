//! Process assembly for the tempora server.
//!
//! Holds the deserialised [`ServerConfig`] and wraps the HTTP surface from
//! `tempora-api` with request tracing.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use serde::Deserialize;
use tempora_core::{policy::VersioningPolicy, store::DocumentStore};
use tempora_engine::{EngineConfig, TemporalEngine};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TEMPORA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                     String,
  pub port:                     u16,
  pub store_path:               PathBuf,
  pub activation_interval_secs: u64,
  pub stale_intent_secs:        u64,
  pub lock_retries:             u32,
  pub lock_backoff_ms:          u64,
  pub versioning:               VersioningPolicy,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let engine = EngineConfig::default();
    Self {
      host:                     "127.0.0.1".into(),
      port:                     8080,
      store_path:               PathBuf::from("tempora.db"),
      activation_interval_secs: 5,
      stale_intent_secs:        engine.stale_intent_after.as_secs(),
      lock_retries:             engine.lock_retries,
      lock_backoff_ms:          engine.lock_backoff.as_millis() as u64,
      versioning:               VersioningPolicy::default(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Period of the activation scheduler. Zero is clamped to one second.
  pub fn activation_interval(&self) -> Duration {
    Duration::from_secs(self.activation_interval_secs.max(1))
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      lock_retries:       self.lock_retries.max(1),
      lock_backoff:       Duration::from_millis(self.lock_backoff_ms),
      stale_intent_after: Duration::from_secs(self.stale_intent_secs),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full HTTP application: the document API plus per-request tracing.
pub fn router<S: DocumentStore + 'static>(engine: Arc<TemporalEngine<S>>) -> Router {
  tempora_api::api_router(engine).layer(TraceLayer::new_for_http())
}
