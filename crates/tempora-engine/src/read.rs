//! The read-path filter: which stored records a read may see, and how they
//! are presented to callers.
//!
//! Point reads pick the revision themselves (see
//! [`crate::TemporalEngine::load`]); query results come back from the store as
//! raw candidates and each one is vetoed or admitted here independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempora_core::{
  document::{Document, StoredRecord},
  key::StoreKey,
  metadata::{self, TemporalMetadata},
  policy::VersioningPolicy,
};

use crate::Result;

/// The verdict on one query candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadVeto {
  Allowed,
  /// Drop the candidate from the result set.
  Ignore,
}

/// Read-path filter for one request.
#[derive(Debug, Clone, Copy)]
pub struct ReadFilter<'a> {
  policy:    &'a VersioningPolicy,
  /// The requested effective date, if the request carried one.
  effective: Option<DateTime<Utc>>,
  now:       DateTime<Utc>,
}

impl<'a> ReadFilter<'a> {
  pub fn new(
    policy: &'a VersioningPolicy,
    effective: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
  ) -> Self {
    Self { policy, effective, now }
  }

  /// The date reads are evaluated at.
  pub fn evaluated_at(&self) -> DateTime<Utc> { self.effective.unwrap_or(self.now) }

  /// Admit a candidate if its collection is unversioned, if no effective
  /// date was requested, or if it is the revision visible at that date.
  /// Write intents are never admitted.
  pub fn veto_read(&self, record: &StoredRecord) -> Result<ReadVeto> {
    let key = StoreKey::parse(&record.key);
    if matches!(key, StoreKey::Intent(_)) {
      return Ok(ReadVeto::Ignore);
    }
    if !self.policy.is_enabled(key.document_id()) {
      return Ok(ReadVeto::Allowed);
    }
    let Some(effective) = self.effective else {
      return Ok(ReadVeto::Allowed);
    };
    let visible = TemporalMetadata::read_from(&record.metadata)?
      .is_some_and(|t| t.is_visible_at(effective));
    Ok(if visible { ReadVeto::Allowed } else { ReadVeto::Ignore })
  }

  /// Present a stored record to the caller: logical id, caller metadata only,
  /// the revision number taken from the key, and the evaluation date stamped
  /// into the temporal metadata.
  pub fn transform_read(&self, record: StoredRecord) -> Result<Document> {
    let key = StoreKey::parse(&record.key);
    let mut temporal = TemporalMetadata::read_from(&record.metadata)?;
    if let Some(t) = temporal.as_mut() {
      if let StoreKey::Revision(rk) = &key {
        t.revision = rk.revision;
      }
      t.effective = Some(self.evaluated_at());
    }

    let mut caller_metadata = record.metadata;
    metadata::strip(&mut caller_metadata);

    Ok(Document {
      id: key.document_id().to_owned(),
      content: record.content,
      metadata: caller_metadata,
      temporal,
      etag: record.etag,
    })
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// The metadata of every revision of a document, ascending by revision
/// number, as reported by [`crate::TemporalEngine::get_history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalHistory {
  pub id:        String,
  pub revisions: Vec<TemporalMetadata>,
}
