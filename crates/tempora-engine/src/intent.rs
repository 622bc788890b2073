//! Write intents: the per-document lock and the unit of atomicity.
//!
//! The backing store only guarantees single-key atomicity, but one save
//! touches several records. Before touching anything, a writer creates
//! `{id}/temporalintent` with a `Missing` precondition; that record is the
//! document's lock. The writer then stores its planned writes, each with the
//! before-image of the record it replaces, applies them in order and finally
//! removes the intent.
//!
//! If applying fails the before-images are restored. If the writer dies, the
//! intent stays behind and the activation scheduler rolls it back once it is
//! older than [`EngineConfig::stale_intent_after`], so a save either lands
//! completely or not at all. Until then readers answer from the intent's
//! before-images (see [`WriteIntent::restore_view`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempora_core::{
  document::{NewRecord, StoredRecord},
  key::intent_key,
  metadata::Metadata,
  store::{DocumentStore, Precondition, WriteOutcome},
};
use uuid::Uuid;

use crate::{Error, Result, config::EngineConfig};

// ─── Planned writes ──────────────────────────────────────────────────────────

/// One single-key write inside an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedWrite {
  pub key:         String,
  /// The record after the write; `None` removes it.
  pub after:       Option<NewRecord>,
  /// The record before the write; `None` means the key was absent.
  pub before:      Option<NewRecord>,
  /// ETag of `before`, checked when the write is applied.
  pub before_etag: Option<String>,
}

impl PlannedWrite {
  /// Replace (or create) a record.
  pub fn put(after: NewRecord, before: Option<StoredRecord>) -> Self {
    let (before, before_etag) = split(before);
    Self { key: after.key.clone(), after: Some(after), before, before_etag }
  }

  /// Remove an existing record.
  pub fn remove(before: StoredRecord) -> Self {
    let key = before.key.clone();
    let (before, before_etag) = split(Some(before));
    Self { key, after: None, before, before_etag }
  }

  async fn apply<S: DocumentStore>(&self, store: &S) -> Result<()> {
    let precondition = match &self.before_etag {
      Some(etag) => Precondition::Matches(etag.clone()),
      None => Precondition::Missing,
    };
    let outcome = match &self.after {
      Some(record) => store.put(record.clone(), precondition).await,
      None => store.delete(&self.key, precondition).await,
    }
    .map_err(Error::storage)?;
    match outcome {
      WriteOutcome::Applied(_) => Ok(()),
      WriteOutcome::Conflict => Err(Error::concurrent_modification(&self.key)),
    }
  }

  /// Restore the before-image unconditionally. Idempotent.
  async fn undo<S: DocumentStore>(&self, store: &S) -> Result<()> {
    let outcome = match &self.before {
      Some(record) => store.put(record.clone(), Precondition::Any).await,
      None => store.delete(&self.key, Precondition::Any).await,
    }
    .map_err(Error::storage)?;
    debug_assert!(outcome.is_applied());
    Ok(())
  }
}

fn split(record: Option<StoredRecord>) -> (Option<NewRecord>, Option<String>) {
  match record {
    Some(r) => {
      let etag = r.etag.clone();
      (Some(NewRecord::from(r)), Some(etag))
    }
    None => (None, None),
  }
}

// ─── Intent record ───────────────────────────────────────────────────────────

/// The content of an intent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteIntent {
  pub document_id: String,
  /// Unique per lock acquisition, so two intents never share an ETag.
  pub token:       Uuid,
  pub started_at:  DateTime<Utc>,
  #[serde(default)]
  pub steps:       Vec<PlannedWrite>,
}

impl WriteIntent {
  fn to_record(&self) -> Result<NewRecord> {
    Ok(NewRecord {
      key:      intent_key(&self.document_id),
      content:  serde_json::to_value(self)?,
      metadata: Metadata::new(),
    })
  }

  pub fn from_record(record: &StoredRecord) -> Result<Self> {
    Ok(serde_json::from_value(record.content.clone())?)
  }

  /// `records` as they stood before this intent's writes. Records a step
  /// touched are replaced by its before-image, or dropped if the step created
  /// them. Before-images are only brought back for keys accepted by
  /// `include`, the key range `records` was read from.
  pub fn restore_view(
    &self,
    records: Vec<StoredRecord>,
    include: impl Fn(&str) -> bool,
  ) -> Vec<StoredRecord> {
    let mut view: Vec<StoredRecord> = records
      .into_iter()
      .filter(|r| self.steps.iter().all(|step| step.key != r.key))
      .collect();
    for step in &self.steps {
      let (Some(before), Some(etag)) = (&step.before, &step.before_etag) else {
        continue;
      };
      if include(&step.key) {
        view.push(StoredRecord {
          key:      before.key.clone(),
          content:  before.content.clone(),
          metadata: before.metadata.clone(),
          etag:     etag.clone(),
        });
      }
    }
    view
  }

  /// Restore every before-image, newest first.
  pub async fn roll_back<S: DocumentStore>(&self, store: &S) -> Result<()> {
    for step in self.steps.iter().rev() {
      step.undo(store).await?;
    }
    Ok(())
  }
}

// ─── Lock ────────────────────────────────────────────────────────────────────

/// A held document lock. Must be finished with [`IntentLock::commit`] or
/// [`IntentLock::release`].
#[derive(Debug)]
pub struct IntentLock {
  intent: WriteIntent,
  etag:   String,
}

impl IntentLock {
  /// Try to take the lock on `document_id`, retrying `attempts` times with
  /// the configured backoff. Returns `None` if it stayed held.
  pub async fn acquire<S: DocumentStore>(
    store: &S,
    document_id: &str,
    now: DateTime<Utc>,
    attempts: u32,
    config: &EngineConfig,
  ) -> Result<Option<Self>> {
    let intent = WriteIntent {
      document_id: document_id.to_owned(),
      token:       Uuid::new_v4(),
      started_at:  now,
      steps:       Vec::new(),
    };
    let record = intent.to_record()?;

    for attempt in 1..=attempts.max(1) {
      let outcome = store
        .put(record.clone(), Precondition::Missing)
        .await
        .map_err(Error::storage)?;
      if let WriteOutcome::Applied(Some(etag)) = outcome {
        return Ok(Some(Self { intent, etag }));
      }
      tracing::trace!(document_id, attempt, "document lock is held; waiting");
      if attempt < attempts {
        tokio::time::sleep(config.lock_backoff).await;
      }
    }
    Ok(None)
  }

  /// Persist `steps`, apply them, and release the lock. On failure the
  /// applied steps are undone before the error is returned.
  pub async fn commit<S: DocumentStore>(
    mut self,
    store: &S,
    steps: Vec<PlannedWrite>,
  ) -> Result<()> {
    if steps.is_empty() {
      return self.release(store).await;
    }

    self.intent.steps = steps;
    let outcome = store
      .put(self.intent.to_record()?, Precondition::Matches(self.etag.clone()))
      .await;
    match outcome {
      Ok(WriteOutcome::Applied(Some(etag))) => self.etag = etag,
      Ok(_) => {
        return Err(Error::concurrent_modification(&intent_key(
          &self.intent.document_id,
        )));
      }
      Err(e) => {
        self.release_quietly(store).await;
        return Err(Error::storage(e));
      }
    }

    let error = match self.apply_all(store).await {
      Ok(()) => return Ok(()),
      Err(e) => e,
    };

    let document_id = self.intent.document_id.as_str();
    match self.intent.roll_back(store).await {
      Ok(()) => {
        tracing::warn!(document_id, error = %error, "write rolled back");
        self.release_quietly(store).await;
      }
      Err(undo_error) => {
        tracing::error!(
          document_id,
          error = %error,
          undo_error = %undo_error,
          "write failed and could not be rolled back; intent left for recovery",
        );
      }
    }
    Err(error)
  }

  async fn apply_all<S: DocumentStore>(&self, store: &S) -> Result<()> {
    for step in &self.intent.steps {
      step.apply(store).await?;
    }
    self.remove(store).await
  }

  /// Release the lock without writing anything.
  pub async fn release<S: DocumentStore>(self, store: &S) -> Result<()> {
    self.remove(store).await
  }

  async fn release_quietly<S: DocumentStore>(&self, store: &S) {
    if let Err(e) = self.remove(store).await {
      tracing::error!(
        document_id = %self.intent.document_id,
        error = %e,
        "failed to release document lock",
      );
    }
  }

  async fn remove<S: DocumentStore>(&self, store: &S) -> Result<()> {
    let key = intent_key(&self.intent.document_id);
    let outcome = store
      .delete(&key, Precondition::Matches(self.etag.clone()))
      .await
      .map_err(Error::storage)?;
    match outcome {
      WriteOutcome::Applied(_) => Ok(()),
      WriteOutcome::Conflict => Err(Error::concurrent_modification(&key)),
    }
  }
}
