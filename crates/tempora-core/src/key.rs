//! Storage key layout.
//!
//! A logical document lives under its natural key (`employees/1`). Each of its
//! revisions lives under `{id}{REVISION_SEPARATOR}{n}`, and an in-flight write
//! holds `{id}{INTENT_SUFFIX}`. Keys are modelled as [`StoreKey`] and only
//! flattened to strings at the storage boundary.

use std::fmt;

use crate::{Error, Result};

/// Separator between a document id and its revision number.
pub const REVISION_SEPARATOR: &str = "/temporalrevisions/";

/// Suffix of the per-document write intent record.
pub const INTENT_SUFFIX: &str = "/temporalintent";

// ─── RevisionKey ─────────────────────────────────────────────────────────────

/// The composite key of one revision of a logical document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionKey {
  pub document_id: String,
  /// 1-based, contiguous, never reused.
  pub revision:    u32,
}

impl RevisionKey {
  pub fn new(document_id: impl Into<String>, revision: u32) -> Self {
    Self { document_id: document_id.into(), revision }
  }

  /// Flatten to the store's key format.
  pub fn encode(&self) -> String {
    format!("{}{REVISION_SEPARATOR}{}", self.document_id, self.revision)
  }

  /// Parse a flat revision key. Fails if the key has no separator or the
  /// suffix is not a positive integer.
  pub fn parse(key: &str) -> Result<Self> {
    let (document_id, suffix) = key
      .rsplit_once(REVISION_SEPARATOR)
      .ok_or_else(|| Error::InvalidRevisionKey(key.to_owned()))?;
    let revision: u32 = suffix
      .parse()
      .map_err(|_| Error::InvalidRevisionKey(key.to_owned()))?;
    if revision == 0 || document_id.is_empty() {
      return Err(Error::InvalidRevisionKey(key.to_owned()));
    }
    Ok(Self::new(document_id, revision))
  }
}

impl fmt::Display for RevisionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.encode())
  }
}

// ─── StoreKey ────────────────────────────────────────────────────────────────

/// Every kind of record this crate writes into the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
  /// The current copy, stored under the natural key.
  Document(String),
  Revision(RevisionKey),
  Intent(String),
}

impl StoreKey {
  /// Classify a flat store key.
  pub fn parse(key: &str) -> Self {
    if let Some(id) = key.strip_suffix(INTENT_SUFFIX) {
      return Self::Intent(id.to_owned());
    }
    match RevisionKey::parse(key) {
      Ok(rk) => Self::Revision(rk),
      Err(_) => Self::Document(key.to_owned()),
    }
  }

  pub fn encode(&self) -> String {
    match self {
      Self::Document(id) => id.clone(),
      Self::Revision(rk) => rk.encode(),
      Self::Intent(id) => intent_key(id),
    }
  }

  /// The logical document id, whatever kind of record this is.
  pub fn document_id(&self) -> &str {
    match self {
      Self::Document(id) | Self::Intent(id) => id,
      Self::Revision(rk) => &rk.document_id,
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// The key prefix shared by every revision of `document_id`.
pub fn revision_prefix(document_id: &str) -> String {
  format!("{document_id}{REVISION_SEPARATOR}")
}

pub fn intent_key(document_id: &str) -> String {
  format!("{document_id}{INTENT_SUFFIX}")
}

/// The collection a document belongs to: the id up to the first `/`, or the
/// whole id if it has none.
pub fn collection_of(document_id: &str) -> &str {
  document_id
    .split_once('/')
    .map_or(document_id, |(collection, _)| collection)
}

/// Reject ids that would collide with revision or intent keys.
pub fn validate_document_id(document_id: &str) -> Result<()> {
  let invalid = |why| Err(Error::InvalidDocumentId(document_id.to_owned(), why));
  if document_id.is_empty() {
    return invalid("empty");
  }
  if document_id.contains(REVISION_SEPARATOR) {
    return invalid("contains the revision separator");
  }
  if document_id.ends_with(INTENT_SUFFIX) {
    return invalid("ends with the intent suffix");
  }
  Ok(())
}
