//! The in-memory working set of one document's revisions.
//!
//! The write path and the activation scheduler both load a [`Chain`], mutate
//! revision metadata through it, and turn the result into [`PlannedWrite`]s.
//! Only revisions that actually changed produce writes, which is what makes
//! re-running activation a no-op.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tempora_core::{
  document::{NewRecord, StoredRecord},
  key::RevisionKey,
  metadata::{self, Metadata, TemporalMetadata},
};

use crate::{Error, Result, intent::PlannedWrite};

/// A decoded revision record.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
  pub key:      RevisionKey,
  pub content:  Value,
  /// Caller metadata, without `temporal-*` entries.
  pub metadata: Metadata,
  pub temporal: TemporalMetadata,
}

impl Revision {
  pub fn decode(record: &StoredRecord) -> Result<Self> {
    let key = RevisionKey::parse(&record.key)?;
    let mut temporal = TemporalMetadata::read_from(&record.metadata)?.ok_or_else(|| {
      Error::InvalidInterval(format!("revision {key} has no temporal metadata"))
    })?;
    temporal.revision = key.revision;
    let mut metadata = record.metadata.clone();
    metadata::strip(&mut metadata);
    Ok(Self { key, content: record.content.clone(), metadata, temporal })
  }

  /// The full store record for this revision.
  pub fn to_record(&self) -> Result<NewRecord> {
    let mut metadata = self.metadata.clone();
    self.temporal.write_to(&mut metadata)?;
    Ok(NewRecord { key: self.key.encode(), content: self.content.clone(), metadata })
  }

  /// The current-copy record mirroring this revision.
  pub fn to_current_record(&self) -> Result<NewRecord> {
    let mut metadata = self.metadata.clone();
    self.temporal.as_current().write_to(&mut metadata)?;
    Ok(NewRecord {
      key: self.key.document_id.clone(),
      content: self.content.clone(),
      metadata,
    })
  }
}

#[derive(Debug)]
struct Slot {
  revision: Revision,
  /// The stored record this slot was loaded from; `None` for a revision
  /// appended by the current write.
  original: Option<StoredRecord>,
  dirty:    bool,
}

#[derive(Debug)]
pub struct Chain {
  document_id: String,
  slots:       Vec<Slot>,
}

impl Chain {
  /// Decode `records` (ascending by revision number) and check that the
  /// numbering is contiguous from 1.
  pub fn load(document_id: &str, records: Vec<StoredRecord>) -> Result<Self> {
    let mut slots = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
      let revision = Revision::decode(&record)?;
      let expected = index as u32 + 1;
      if revision.key.revision != expected || revision.key.document_id != document_id {
        return Err(Error::InvalidInterval(format!(
          "{document_id}: expected revision {expected}, found {}",
          revision.key
        )));
      }
      slots.push(Slot { revision, original: Some(record), dirty: false });
    }
    Ok(Self { document_id: document_id.to_owned(), slots })
  }

  pub fn next_revision(&self) -> u32 { self.slots.len() as u32 + 1 }

  pub fn revisions(&self) -> impl Iterator<Item = &Revision> {
    self.slots.iter().map(|s| &s.revision)
  }

  pub fn has_due_pending(&self, now: DateTime<Utc>) -> bool {
    self.revisions().any(|r| {
      r.temporal.pending && r.temporal.is_live() && r.temporal.effective_start <= now
    })
  }

  /// Append a new revision; its metadata must already carry the next
  /// revision number.
  pub fn append(&mut self, revision: Revision) -> Result<()> {
    if revision.key.revision != self.next_revision() {
      return Err(Error::InvalidInterval(format!(
        "{}: cannot append revision {} after {}",
        self.document_id,
        revision.key.revision,
        self.slots.len()
      )));
    }
    self.slots.push(Slot { revision, original: None, dirty: true });
    Ok(())
  }

  // ── Chain repair ──────────────────────────────────────────────────────────

  /// Make room for a revision that will cover `[effective, ∞)`.
  ///
  /// Every live revision starting at or after `effective` is fully shadowed
  /// and becomes an artifact. The live revision immediately preceding
  /// `effective` is truncated to end there if its window reaches past it.
  /// Returns the number of revisions touched.
  pub fn repair_for(&mut self, effective: DateTime<Utc>, now: DateTime<Utc>) -> usize {
    let mut touched = 0;
    for slot in self.slots.iter_mut() {
      let t = &mut slot.revision.temporal;
      if t.is_live() && t.effective_start >= effective {
        tracing::debug!(
          document_id = %self.document_id,
          revision = t.revision,
          "revision shadowed by an earlier edit; marking as artifact",
        );
        t.mark_artifact(now);
        slot.dirty = true;
        touched += 1;
      }
    }
    if self.truncate_predecessor(effective, now) {
      touched += 1;
    }
    touched
  }

  /// Truncate the live revision with the latest start before `at` so that it
  /// ends at `at`, unless it already does. Returns whether it changed.
  pub fn truncate_predecessor(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let predecessor = self
      .slots
      .iter_mut()
      .filter(|s| s.revision.temporal.is_live() && s.revision.temporal.effective_start < at)
      .max_by_key(|s| s.revision.temporal.effective_start);
    let Some(slot) = predecessor else {
      return false;
    };
    let t = &mut slot.revision.temporal;
    if t.effective_until.is_some_and(|until| until <= at) {
      return false;
    }
    tracing::debug!(
      document_id = %self.document_id,
      revision = t.revision,
      until = %at,
      "truncating effective window",
    );
    t.truncate(at, now);
    slot.dirty = true;
    true
  }

  // ── Activation ────────────────────────────────────────────────────────────

  /// Clear `pending` on every live revision whose effective start has
  /// arrived, truncating its predecessor if an intervening write has not
  /// already done so. Returns the activated revision numbers.
  pub fn activate_due(&mut self, now: DateTime<Utc>) -> Vec<u32> {
    let due: Vec<(usize, DateTime<Utc>)> = self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, s)| {
        let t = &s.revision.temporal;
        t.pending && t.is_live() && t.effective_start <= now
      })
      .map(|(i, s)| (i, s.revision.temporal.effective_start))
      .collect();

    let mut activated = Vec::with_capacity(due.len());
    for (index, start) in due {
      self.truncate_predecessor(start, now);
      let slot = &mut self.slots[index];
      slot.revision.temporal.pending = false;
      slot.dirty = true;
      activated.push(slot.revision.key.revision);
    }
    activated
  }

  // ── Current copy ──────────────────────────────────────────────────────────

  /// The revision the current copy should mirror at `now`: live, not
  /// pending, and containing `now`. A deleted revision yields `None`.
  pub fn current_at(&self, now: DateTime<Utc>) -> Option<&Revision> {
    self
      .revisions()
      .filter(|r| r.temporal.is_live() && !r.temporal.pending && r.temporal.contains(now))
      .max_by_key(|r| r.temporal.effective_start)
      .filter(|r| !r.temporal.deleted)
  }

  // ── Planning ──────────────────────────────────────────────────────────────

  /// The writes that bring the store in line with this chain: changed
  /// revisions first (oldest first, appended ones last), then the current
  /// copy if it no longer matches.
  pub fn into_writes(
    self,
    current: Option<StoredRecord>,
    now: DateTime<Utc>,
  ) -> Result<Vec<PlannedWrite>> {
    let desired = self.current_at(now).map(Revision::to_current_record).transpose()?;

    let mut writes = Vec::new();
    for slot in self.slots {
      if !slot.dirty {
        continue;
      }
      slot.revision.temporal.validate()?;
      writes.push(PlannedWrite::put(slot.revision.to_record()?, slot.original));
    }

    match (desired, current) {
      (Some(want), Some(have))
        if want.content == have.content && want.metadata == have.metadata => {}
      (Some(want), have) => writes.push(PlannedWrite::put(want, have)),
      (None, Some(have)) => writes.push(PlannedWrite::remove(have)),
      (None, None) => {}
    }
    Ok(writes)
  }
}
