//! Temporal metadata: the vocabulary every other component shares.
//!
//! A revision carries two independent intervals: the *effective* window
//! (when the fact holds in the modelled world) and the *asserted* window (when
//! the system held the belief). Both are half-open `[start, until)`; an absent
//! `until` means the window is open-ended.
//!
//! On disk the metadata is flattened into the document store's generic
//! metadata map under `temporal-*` entries so that caller-supplied metadata can
//! live alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// The store's generic per-document metadata container.
pub type Metadata = serde_json::Map<String, Value>;

/// Prefix of every metadata entry owned by this crate.
pub const METADATA_PREFIX: &str = "temporal-";

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TemporalStatus {
  /// Carried only by the current-copy record.
  Current,
  /// A live revision in the effective-time chain.
  Revision,
  /// Fully shadowed by a later out-of-order edit; kept for audit only.
  Artifact,
}

// ─── TemporalMetadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemporalMetadata {
  pub status:          TemporalStatus,
  pub revision:        u32,
  pub effective_start: DateTime<Utc>,
  #[serde(default)]
  pub effective_until: Option<DateTime<Utc>>,
  pub asserted_start:  DateTime<Utc>,
  #[serde(default)]
  pub asserted_until:  Option<DateTime<Utc>>,
  /// The effective start lay in the future when this revision was asserted
  /// and it has not been activated yet.
  #[serde(default)]
  pub pending:         bool,
  #[serde(default)]
  pub deleted:         bool,
  /// The effective date a read was evaluated at. Only set on read results,
  /// never persisted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub effective:       Option<DateTime<Utc>>,
}

impl TemporalMetadata {
  /// Metadata for a freshly asserted revision covering
  /// `[effective_start, ∞)`.
  pub fn new_revision(
    revision: u32,
    effective_start: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      status: TemporalStatus::Revision,
      revision,
      effective_start,
      effective_until: None,
      asserted_start: now,
      asserted_until: None,
      pending: effective_start > now,
      deleted: false,
      effective: None,
    }
  }

  /// `effective_start <= at < effective_until`.
  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.effective_start <= at && self.effective_until.is_none_or(|u| at < u)
  }

  /// Whether this revision answers an "effective at `at`" read.
  pub fn is_visible_at(&self, at: DateTime<Utc>) -> bool {
    self.status == TemporalStatus::Revision && self.contains(at) && !self.deleted
  }

  /// Live revisions take part in the effective-time chain; artifacts do not.
  pub fn is_live(&self) -> bool { self.status != TemporalStatus::Artifact }

  /// End the effective window at `until`. The old, longer window stops being
  /// asserted at `now`.
  pub fn truncate(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) {
    self.effective_until = Some(until);
    self.asserted_until = Some(now);
  }

  /// Re-tag as fully superseded. Artifacts are never activated.
  pub fn mark_artifact(&mut self, now: DateTime<Utc>) {
    self.status = TemporalStatus::Artifact;
    self.pending = false;
    self.asserted_until = Some(now);
  }

  /// The metadata the current copy carries when it mirrors this revision.
  pub fn as_current(&self) -> Self {
    Self {
      status: TemporalStatus::Current,
      pending: false,
      effective: None,
      ..self.clone()
    }
  }

  /// Check the interval invariants. Violations indicate a programming or
  /// data-corruption bug and are never repaired silently.
  pub fn validate(&self) -> Result<()> {
    if self.revision == 0 {
      return Err(Error::InvalidInterval("revision number 0".into()));
    }
    if let Some(until) = self.effective_until
      && until <= self.effective_start
    {
      return Err(Error::InvalidInterval(format!(
        "revision {}: effective window [{}, {until}) is empty",
        self.revision, self.effective_start
      )));
    }
    if let Some(until) = self.asserted_until
      && until < self.asserted_start
    {
      return Err(Error::InvalidInterval(format!(
        "revision {}: asserted until {until} precedes asserted start {}",
        self.revision, self.asserted_start
      )));
    }
    Ok(())
  }

  // ── Metadata container ──────────────────────────────────────────────────

  /// Write the `temporal-*` entries into `metadata`, replacing any previous
  /// ones and leaving all other entries untouched.
  pub fn write_to(&self, metadata: &mut Metadata) -> Result<()> {
    strip(metadata);
    if let Value::Object(fields) = serde_json::to_value(self)? {
      for (name, value) in fields {
        metadata.insert(format!("{METADATA_PREFIX}{name}"), value);
      }
    }
    Ok(())
  }

  /// Read the `temporal-*` entries. Returns `None` if there are none, i.e.
  /// the record was written without temporal versioning.
  pub fn read_from(metadata: &Metadata) -> Result<Option<Self>> {
    let fields: serde_json::Map<String, Value> = metadata
      .iter()
      .filter_map(|(name, value)| {
        name
          .strip_prefix(METADATA_PREFIX)
          .map(|field| (field.to_owned(), value.clone()))
      })
      .collect();
    if fields.is_empty() {
      return Ok(None);
    }
    Ok(Some(serde_json::from_value(Value::Object(fields))?))
  }
}

/// Remove every `temporal-*` entry, leaving caller metadata only.
pub fn strip(metadata: &mut Metadata) {
  metadata.retain(|name, _| !name.starts_with(METADATA_PREFIX));
}
