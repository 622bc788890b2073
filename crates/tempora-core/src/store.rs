//! The `DocumentStore` trait and supporting query types.
//!
//! This is the seam to the external document store: flat keys, arbitrary
//! metadata per record, optimistic concurrency through ETag preconditions, and
//! enumeration by key range. The temporal engine is written against this trait
//! only; backends live in their own crates (e.g. `tempora-store-sqlite`), and
//! [`crate::memory::MemoryStore`] serves tests.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  document::{NewRecord, StoredRecord},
  key::StoreKey,
  metadata::Metadata,
};

// ─── Preconditions ───────────────────────────────────────────────────────────

/// Optimistic-concurrency condition checked atomically with a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
  /// Last writer wins.
  Any,
  /// The key must not exist.
  Missing,
  /// The key must exist with exactly this ETag.
  Matches(String),
}

impl Precondition {
  /// Evaluate against the ETag currently stored under the key, if any.
  pub fn holds(&self, current: Option<&str>) -> bool {
    match self {
      Self::Any => true,
      Self::Missing => current.is_none(),
      Self::Matches(expected) => current == Some(expected.as_str()),
    }
  }
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
  /// The write was applied. Carries the record's new ETag, or `None` after a
  /// delete.
  Applied(Option<String>),
  /// The precondition did not hold; nothing was written.
  Conflict,
}

impl WriteOutcome {
  pub fn is_applied(&self) -> bool { matches!(self, Self::Applied(_)) }

  pub fn etag(&self) -> Option<&str> {
    match self {
      Self::Applied(etag) => etag.as_deref(),
      Self::Conflict => None,
    }
  }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Which kind of record a query ranges over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
  /// Records under natural keys: current copies and unversioned documents.
  #[default]
  Documents,
  /// Revision records.
  Revisions,
  /// In-flight write intents.
  Intents,
}

impl QueryScope {
  pub fn includes(&self, key: &StoreKey) -> bool {
    matches!(
      (self, key),
      (Self::Documents, StoreKey::Document(_))
        | (Self::Revisions, StoreKey::Revision(_))
        | (Self::Intents, StoreKey::Intent(_))
    )
  }
}

/// Parameters for [`DocumentStore::query`]. Results are ordered by document id,
/// then revision number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
  #[serde(default)]
  pub scope:           QueryScope,
  /// Restrict to logical document ids starting with this prefix, e.g.
  /// `"employees/"`.
  pub id_prefix:       Option<String>,
  /// Top-level content fields that must equal the given values.
  #[serde(default)]
  pub content_equals:  serde_json::Map<String, Value>,
  /// Metadata entries that must equal the given values.
  #[serde(default)]
  pub metadata_equals: Metadata,
  pub limit:           Option<usize>,
  pub offset:          Option<usize>,
}

impl DocumentQuery {
  /// Whether `record` satisfies every filter except limit and offset. A
  /// missing field compares equal to `null`.
  pub fn matches(&self, record: &StoredRecord) -> bool {
    let key = StoreKey::parse(&record.key);
    if !self.scope.includes(&key) {
      return false;
    }
    if let Some(prefix) = &self.id_prefix
      && !key.document_id().starts_with(prefix.as_str())
    {
      return false;
    }
    let field_eq = |map: &serde_json::Map<String, Value>, name: &str, v: &Value| {
      map.get(name).map_or(v.is_null(), |stored| json_eq(stored, v))
    };
    let content_ok = match &record.content {
      Value::Object(fields) => self
        .content_equals
        .iter()
        .all(|(name, v)| field_eq(fields, name, v)),
      _ => self.content_equals.is_empty(),
    };
    content_ok
      && self
        .metadata_equals
        .iter()
        .all(|(name, v)| field_eq(&record.metadata, name, v))
  }
}

/// Field equality as the SQL backends evaluate it: numbers compare by value,
/// so `10` equals `10.0`.
fn json_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
      (Some(x), Some(y)) => x == y,
      _ => x.as_f64() == y.as_f64(),
    },
    _ => a == b,
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the external document store.
///
/// Each call is atomic for the single key it touches; there are no
/// multi-key transactions. All methods return `Send` futures so the trait can
/// be used from multi-threaded async runtimes.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the record stored under `key`. Returns `None` if absent.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<StoredRecord>, Self::Error>> + Send + 'a;

  /// Write `record`, replacing any existing record under its key, if
  /// `precondition` holds.
  fn put(
    &self,
    record: NewRecord,
    precondition: Precondition,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Remove the record under `key` if `precondition` holds. Deleting an
  /// absent key under [`Precondition::Any`] succeeds.
  fn delete<'a>(
    &'a self,
    key: &'a str,
    precondition: Precondition,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + 'a;

  /// Every revision record of `document_id`, ascending by revision number.
  fn list_revisions<'a>(
    &'a self,
    document_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredRecord>, Self::Error>> + Send + 'a;

  /// Enumerate records matching `query`.
  fn query<'a>(
    &'a self,
    query: &'a DocumentQuery,
  ) -> impl Future<Output = Result<Vec<StoredRecord>, Self::Error>> + Send + 'a;
}
