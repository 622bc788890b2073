//! Encoding and decoding helpers between store records and the plain-text
//! representations held in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings; content and metadata as compact
//! JSON.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tempora_core::{
  document::StoredRecord,
  key::StoreKey,
  metadata::Metadata,
  store::QueryScope,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Keys ────────────────────────────────────────────────────────────────────

pub fn encode_scope(scope: QueryScope) -> &'static str {
  match scope {
    QueryScope::Documents => "document",
    QueryScope::Revisions => "revision",
    QueryScope::Intents => "intent",
  }
}

/// The derived `(kind, document_id, revision)` columns for `key`.
pub fn key_columns(key: &str) -> (&'static str, String, Option<u32>) {
  match StoreKey::parse(key) {
    StoreKey::Document(id) => (encode_scope(QueryScope::Documents), id, None),
    StoreKey::Revision(rk) => {
      (encode_scope(QueryScope::Revisions), rk.document_id, Some(rk.revision))
    }
    StoreKey::Intent(id) => (encode_scope(QueryScope::Intents), id, None),
  }
}

// ─── JSON filters ────────────────────────────────────────────────────────────

/// A `json_extract` path selecting the top-level member `name`.
pub fn json_member_path(name: &str) -> String {
  format!("$.\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `records` row.
pub struct RawRecord {
  pub key:      String,
  pub content:  String,
  pub metadata: String,
  pub etag:     String,
}

impl RawRecord {
  pub const COLUMNS: &'static str = "key, content, metadata, etag";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key:      row.get(0)?,
      content:  row.get(1)?,
      metadata: row.get(2)?,
      etag:     row.get(3)?,
    })
  }

  pub fn into_record(self) -> Result<StoredRecord> {
    let content: Value = serde_json::from_str(&self.content)?;
    let metadata: Metadata = match serde_json::from_str(&self.metadata)? {
      Value::Object(map) => map,
      _ => {
        return Err(Error::NotAnObject { key: self.key, column: "metadata" });
      }
    };
    Ok(StoredRecord { key: self.key, content, metadata, etag: self.etag })
  }
}
