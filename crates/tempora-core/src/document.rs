//! Records as the backing store sees them, and documents as callers see them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::{Metadata, TemporalMetadata};

// ─── Store records ───────────────────────────────────────────────────────────

/// A record as held by the backing store under a flat key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
  pub key:      String,
  pub content:  Value,
  pub metadata: Metadata,
  /// Assigned by the store on every write; see [`crate::etag`].
  pub etag:     String,
}

/// Input to [`crate::store::DocumentStore::put`]. The etag is always
/// computed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
  pub key:      String,
  pub content:  Value,
  pub metadata: Metadata,
}

impl From<StoredRecord> for NewRecord {
  fn from(r: StoredRecord) -> Self {
    Self { key: r.key, content: r.content, metadata: r.metadata }
  }
}

// ─── Caller-facing document ──────────────────────────────────────────────────

/// A document returned to callers. `id` is always the logical id, never an
/// internal revision key; `metadata` holds caller entries only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id:       String,
  pub content:  Value,
  #[serde(default)]
  pub metadata: Metadata,
  /// Absent for documents whose collection is not temporally versioned.
  pub temporal: Option<TemporalMetadata>,
  pub etag:     String,
}
