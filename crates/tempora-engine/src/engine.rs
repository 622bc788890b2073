//! [`TemporalEngine`]: the write path and the caller-facing operations.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempora_core::{
  document::{Document, NewRecord, StoredRecord},
  key::{RevisionKey, StoreKey, intent_key, validate_document_id},
  metadata::{self, METADATA_PREFIX, Metadata, TemporalMetadata},
  policy::VersioningPolicy,
  store::{DocumentQuery, DocumentStore, Precondition, QueryScope, WriteOutcome},
};

use crate::{
  Error, Result,
  chain::{Chain, Revision},
  clock::{Clock, SystemClock},
  config::EngineConfig,
  intent::{IntentLock, PlannedWrite, WriteIntent},
  read::{ReadFilter, ReadVeto, TemporalHistory},
};

// ─── Inputs and outputs ──────────────────────────────────────────────────────

/// A document as submitted to [`TemporalEngine::save`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
  pub content:   Value,
  /// Caller metadata. `temporal-*` entries are reserved and dropped.
  #[serde(default)]
  pub metadata:  Metadata,
  /// When the content starts to hold; defaults to the assertion time.
  #[serde(default)]
  pub effective: Option<DateTime<Utc>>,
}

impl NewDocument {
  pub fn new(content: Value) -> Self {
    Self { content, metadata: Metadata::new(), effective: None }
  }

  pub fn with_metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn effective_at(mut self, effective: DateTime<Utc>) -> Self {
    self.effective = Some(effective);
    self
  }
}

/// What a save or delete wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
  pub id:       String,
  /// The new revision's metadata; `None` for unversioned collections.
  pub temporal: Option<TemporalMetadata>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Bitemporal versioning over a [`DocumentStore`].
///
/// Every mutation of a document happens under its write intent (see
/// [`crate::intent`]), so saves, deletes and activations of one document are
/// serialised and each lands atomically.
pub struct TemporalEngine<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  policy: VersioningPolicy,
  config: EngineConfig,
}

impl<S: DocumentStore> TemporalEngine<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      clock: Arc::new(SystemClock),
      policy: VersioningPolicy::default(),
      config: EngineConfig::default(),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_policy(mut self, policy: VersioningPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn policy(&self) -> &VersioningPolicy { &self.policy }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  // ── Write path ────────────────────────────────────────────────────────────

  /// Assert `document` as a new revision of `id`.
  pub async fn save(&self, id: &str, document: NewDocument) -> Result<SaveOutcome> {
    validate_document_id(id)?;
    let NewDocument { content, mut metadata, effective } = document;
    metadata::strip(&mut metadata);

    if !self.policy.is_enabled(id) {
      let record = NewRecord { key: id.to_owned(), content, metadata };
      let outcome = self
        .store
        .put(record, Precondition::Any)
        .await
        .map_err(Error::storage)?;
      return match outcome {
        WriteOutcome::Applied(_) => Ok(SaveOutcome { id: id.to_owned(), temporal: None }),
        WriteOutcome::Conflict => Err(Error::Conflict(id.to_owned())),
      };
    }

    let now = self.clock.now();
    let effective = effective.unwrap_or(now);
    let temporal = self
      .locked_write(id, now, self.config.lock_retries, |mut chain, current| {
        self.activate_in_passing(&mut chain, id, now);
        let temporal =
          self.before_save(&mut chain, id, content, metadata, effective, false, now)?;
        Ok((chain.into_writes(current, now)?, temporal))
      })
      .await?
      .ok_or_else(|| Error::Conflict(id.to_owned()))?;

    tracing::debug!(
      document_id = id,
      revision = temporal.revision,
      effective = %temporal.effective_start,
      pending = temporal.pending,
      "revision saved",
    );
    Ok(SaveOutcome { id: id.to_owned(), temporal: Some(temporal) })
  }

  /// Soft-delete `id` from `effective` (default: now) onwards. The deletion
  /// is a revision carrying the content visible at that date; fails with
  /// [`Error::NotFound`] if nothing is visible then.
  pub async fn delete(
    &self,
    id: &str,
    effective: Option<DateTime<Utc>>,
  ) -> Result<SaveOutcome> {
    validate_document_id(id)?;

    if !self.policy.is_enabled(id) {
      let existing = self.get_record(id).await?;
      let Some(existing) = existing else {
        return Err(Error::NotFound(id.to_owned()));
      };
      let outcome = self
        .store
        .delete(id, Precondition::Matches(existing.etag))
        .await
        .map_err(Error::storage)?;
      return match outcome {
        WriteOutcome::Applied(_) => Ok(SaveOutcome { id: id.to_owned(), temporal: None }),
        WriteOutcome::Conflict => Err(Error::Conflict(id.to_owned())),
      };
    }

    let now = self.clock.now();
    let effective = effective.unwrap_or(now);
    let temporal = self
      .locked_write(id, now, self.config.lock_retries, |mut chain, current| {
        self.activate_in_passing(&mut chain, id, now);
        let visible = chain
          .revisions()
          .filter(|r| r.temporal.is_visible_at(effective))
          .max_by_key(|r| r.temporal.effective_start)
          .cloned();
        let Some(Revision { content, metadata, .. }) = visible else {
          return Err(Error::NotFound(id.to_owned()));
        };
        let temporal =
          self.before_save(&mut chain, id, content, metadata, effective, true, now)?;
        Ok((chain.into_writes(current, now)?, temporal))
      })
      .await?
      .ok_or_else(|| Error::Conflict(id.to_owned()))?;

    tracing::debug!(
      document_id = id,
      revision = temporal.revision,
      effective = %temporal.effective_start,
      "document deleted",
    );
    Ok(SaveOutcome { id: id.to_owned(), temporal: Some(temporal) })
  }

  /// Append a new revision to `chain`, repairing the windows of the
  /// revisions it overlaps. Returns the new revision's metadata.
  #[allow(clippy::too_many_arguments)]
  pub fn before_save(
    &self,
    chain: &mut Chain,
    id: &str,
    content: Value,
    metadata: Metadata,
    effective: DateTime<Utc>,
    deleted: bool,
    now: DateTime<Utc>,
  ) -> Result<TemporalMetadata> {
    let revision = chain.next_revision();
    let repaired = chain.repair_for(effective, now);

    let mut temporal = TemporalMetadata::new_revision(revision, effective, now);
    temporal.deleted = deleted;
    temporal.validate()?;

    chain.append(Revision {
      key: RevisionKey::new(id, revision),
      content,
      metadata,
      temporal: temporal.clone(),
    })?;
    tracing::debug!(document_id = id, revision, repaired, "planned revision");
    Ok(temporal)
  }

  // ── Activation ────────────────────────────────────────────────────────────

  /// Promote revisions that came due before the scheduler got to them, so a
  /// write planned in the meantime sees the chain the scheduler would have
  /// left and keeps the current copy.
  fn activate_in_passing(&self, chain: &mut Chain, id: &str, now: DateTime<Utc>) {
    for revision in chain.activate_due(now) {
      tracing::info!(document_id = id, revision, "pending revision activated by write");
    }
  }

  /// Promote every pending revision of `id` whose effective start has
  /// arrived. Makes a single lock attempt; returns `false` if the document
  /// was busy or had nothing to activate.
  pub async fn activate(&self, id: &str) -> Result<bool> {
    let now = self.clock.now();
    let activated = self
      .locked_write(id, now, 1, |mut chain, current| {
        let activated = chain.activate_due(now);
        Ok((chain.into_writes(current, now)?, activated))
      })
      .await?;

    let Some(activated) = activated else {
      tracing::debug!(document_id = id, "document busy; activation deferred");
      return Ok(false);
    };
    for revision in &activated {
      tracing::info!(document_id = id, revision, "pending revision activated");
    }
    Ok(!activated.is_empty())
  }

  /// Ids of documents with a pending revision whose effective start has
  /// arrived, in id order.
  pub async fn due_documents(&self) -> Result<Vec<String>> {
    let now = self.clock.now();
    let mut query = DocumentQuery { scope: QueryScope::Revisions, ..Default::default() };
    query
      .metadata_equals
      .insert(format!("{METADATA_PREFIX}pending"), Value::Bool(true));

    let records = self.store.query(&query).await.map_err(Error::storage)?;
    let mut due = BTreeSet::new();
    for record in &records {
      let revision = Revision::decode(record)?;
      let t = &revision.temporal;
      if t.pending && t.is_live() && t.effective_start <= now {
        due.insert(revision.key.document_id);
      }
    }
    Ok(due.into_iter().collect())
  }

  /// Roll back every write intent older than the configured threshold.
  /// Returns how many were recovered.
  pub async fn recover_stale_intents(&self) -> Result<usize> {
    let now = self.clock.now();
    let query = DocumentQuery { scope: QueryScope::Intents, ..Default::default() };
    let records = self.store.query(&query).await.map_err(Error::storage)?;

    let mut recovered = 0;
    for record in records {
      let intent = WriteIntent::from_record(&record)?;
      let age = (now - intent.started_at).to_std().unwrap_or_default();
      if age < self.config.stale_intent_after {
        continue;
      }

      intent.roll_back(&*self.store).await?;
      let outcome = self
        .store
        .delete(&record.key, Precondition::Matches(record.etag.clone()))
        .await
        .map_err(Error::storage)?;
      if outcome.is_applied() {
        tracing::warn!(
          document_id = %intent.document_id,
          steps = intent.steps.len(),
          started_at = %intent.started_at,
          "rolled back abandoned write",
        );
        recovered += 1;
      }
    }
    Ok(recovered)
  }

  // ── Read path ─────────────────────────────────────────────────────────────

  /// Point read. Without an effective date this is the current copy; with
  /// one it is the revision visible at that date.
  pub async fn load(
    &self,
    id: &str,
    effective: Option<DateTime<Utc>>,
  ) -> Result<Option<Document>> {
    let filter = self.filter(effective);
    let versioned = self.policy.is_enabled(id);
    let record = match effective {
      Some(at) if versioned => {
        let records = self.settled_revisions(id).await?;
        let mut visible = None;
        for record in records {
          let start = TemporalMetadata::read_from(&record.metadata)?
            .filter(|t| t.is_visible_at(at))
            .map(|t| t.effective_start);
          if let Some(start) = start
            && visible.as_ref().is_none_or(|(best, _)| start > *best)
          {
            visible = Some((start, record));
          }
        }
        visible.map(|(_, record)| record)
      }
      _ if versioned => self.settled_record(id, id).await?,
      _ => self.get_record(id).await?,
    };
    record.map(|r| filter.transform_read(r)).transpose()
  }

  /// Revision `revision` of `id`, whatever its status.
  pub async fn get_revision(&self, id: &str, revision: u32) -> Result<Option<Document>> {
    let key = RevisionKey::new(id, revision).encode();
    let record = self.settled_record(id, &key).await?;
    let filter = self.filter(None);
    record.map(|r| filter.transform_read(r)).transpose()
  }

  /// Revisions of `id`, ascending by revision number.
  pub async fn list_revisions(
    &self,
    id: &str,
    offset: usize,
    count: Option<usize>,
  ) -> Result<Vec<Document>> {
    let records = self.settled_revisions(id).await?;
    let filter = self.filter(None);
    records
      .into_iter()
      .skip(offset)
      .take(count.unwrap_or(usize::MAX))
      .map(|r| filter.transform_read(r))
      .collect()
  }

  /// The temporal metadata of every revision of `id`.
  pub async fn get_history(&self, id: &str) -> Result<TemporalHistory> {
    let records = self.settled_revisions(id).await?;
    if records.is_empty() {
      return Err(Error::NotFound(id.to_owned()));
    }
    let chain = Chain::load(id, records)?;
    Ok(TemporalHistory {
      id:        id.to_owned(),
      revisions: chain.revisions().map(|r| r.temporal.clone()).collect(),
    })
  }

  /// Run `query` and pass every candidate through the read filter.
  ///
  /// With an effective date, current copies and revisions are both
  /// candidates, so versioned documents are answered from the revision
  /// visible at that date and unversioned ones as stored. Without one, the
  /// query's own scope is used and results pass through unfiltered. Limit
  /// and offset apply to the filtered result.
  pub async fn query(
    &self,
    query: &DocumentQuery,
    effective: Option<DateTime<Utc>>,
  ) -> Result<Vec<Document>> {
    let filter = self.filter(effective);
    let scopes = match effective {
      Some(_) => vec![QueryScope::Documents, QueryScope::Revisions],
      None => vec![query.scope],
    };

    let scoped = |scope| DocumentQuery { scope, limit: None, offset: None, ..query.clone() };

    let mut in_flight = self.in_flight(query).await?;
    let mut candidates = Vec::new();
    for &scope in &scopes {
      candidates.extend(self.store.query(&scoped(scope)).await.map_err(Error::storage)?);
    }
    in_flight.extend(self.in_flight(query).await?);

    // Documents with a write in flight are answered from their settled
    // records instead of whatever the store holds mid-write.
    candidates.retain(|r| !in_flight.contains(StoreKey::parse(&r.key).document_id()));
    for id in &in_flight {
      for &scope in &scopes {
        let records: Vec<StoredRecord> = match scope {
          QueryScope::Documents => self.settled_record(id, id).await?.into_iter().collect(),
          QueryScope::Revisions => self.settled_revisions(id).await?,
          QueryScope::Intents => Vec::new(),
        };
        let wanted = scoped(scope);
        candidates.extend(records.into_iter().filter(|r| wanted.matches(r)));
      }
    }

    let mut results = Vec::new();
    for record in candidates {
      if filter.veto_read(&record)? == ReadVeto::Allowed {
        results.push(filter.transform_read(record)?);
      }
    }

    results.sort_by(|a, b| {
      let revision = |d: &Document| d.temporal.as_ref().map_or(0, |t| t.revision);
      a.id.cmp(&b.id).then_with(|| revision(a).cmp(&revision(b)))
    });
    Ok(
      results
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  fn filter(&self, effective: Option<DateTime<Utc>>) -> ReadFilter<'_> {
    ReadFilter::new(&self.policy, effective, self.clock.now())
  }

  async fn get_record(&self, key: &str) -> Result<Option<StoredRecord>> {
    self.store.get(key).await.map_err(Error::storage)
  }

  /// The write intent held on `id`, with its ETag.
  async fn intent_of(&self, id: &str) -> Result<Option<(String, WriteIntent)>> {
    let Some(record) = self.get_record(&intent_key(id)).await? else {
      return Ok(None);
    };
    let intent = WriteIntent::from_record(&record)?;
    Ok(Some((record.etag, intent)))
  }

  /// Ids of documents holding a write intent within `query`'s id range.
  async fn in_flight(&self, query: &DocumentQuery) -> Result<BTreeSet<String>> {
    let intents = DocumentQuery {
      scope: QueryScope::Intents,
      id_prefix: query.id_prefix.clone(),
      ..Default::default()
    };
    let records = self.store.query(&intents).await.map_err(Error::storage)?;
    Ok(
      records
        .iter()
        .map(|r| StoreKey::parse(&r.key).document_id().to_owned())
        .collect(),
    )
  }

  /// Run `read` over records of `id` as of its last completed write.
  ///
  /// While an intent is held, records its steps touch are answered from
  /// their before-images, so a write in progress, or one that died mid-apply
  /// and awaits recovery, is never seen half done. `include` names the keys
  /// `read` ranges over. The read is retried if the intent changed under it.
  async fn settled<F, Fut>(
    &self,
    id: &str,
    read: F,
    include: impl Fn(&str) -> bool,
  ) -> Result<Vec<StoredRecord>>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<StoredRecord>>>,
  {
    let etag = |intent: &Option<(String, WriteIntent)>| intent.as_ref().map(|(e, _)| e.clone());
    for attempt in 1..=self.config.lock_retries.max(1) {
      let before = self.intent_of(id).await?;
      let records = read().await?;
      let after = self.intent_of(id).await?;
      if etag(&before) != etag(&after) {
        tracing::trace!(document_id = id, attempt, "write intent moved during read; retrying");
        tokio::time::sleep(self.config.lock_backoff).await;
        continue;
      }
      return Ok(match after {
        Some((_, intent)) => intent.restore_view(records, &include),
        None => records,
      });
    }
    Err(Error::Conflict(id.to_owned()))
  }

  async fn settled_revisions(&self, id: &str) -> Result<Vec<StoredRecord>> {
    let mut records = self
      .settled(
        id,
        move || async move { self.store.list_revisions(id).await.map_err(Error::storage) },
        |key| matches!(StoreKey::parse(key), StoreKey::Revision(_)),
      )
      .await?;
    records.sort_by_key(|r| RevisionKey::parse(&r.key).map_or(0, |k| k.revision));
    Ok(records)
  }

  async fn settled_record(&self, id: &str, key: &str) -> Result<Option<StoredRecord>> {
    let records = self
      .settled(
        id,
        move || async move { self.get_record(key).await.map(|r| r.into_iter().collect()) },
        |k| k == key,
      )
      .await?;
    Ok(records.into_iter().next())
  }

  /// Take the lock on `id`, load its chain and current copy, let `plan`
  /// decide the writes, and commit them. Returns `None` if the lock could
  /// not be taken in `attempts` tries.
  async fn locked_write<T, F>(
    &self,
    id: &str,
    now: DateTime<Utc>,
    attempts: u32,
    plan: F,
  ) -> Result<Option<T>>
  where
    F: FnOnce(Chain, Option<StoredRecord>) -> Result<(Vec<PlannedWrite>, T)>,
  {
    let store = &*self.store;
    let Some(lock) = IntentLock::acquire(store, id, now, attempts, &self.config).await?
    else {
      return Ok(None);
    };

    let planned = match self.load_chain(id).await {
      Ok((chain, current)) => plan(chain, current),
      Err(e) => Err(e),
    };
    match planned {
      Ok((steps, value)) => {
        tracing::debug!(document_id = id, steps = steps.len(), "committing write");
        lock.commit(store, steps).await?;
        Ok(Some(value))
      }
      Err(e) => {
        if let Err(release) = lock.release(store).await {
          tracing::error!(document_id = id, error = %release, "failed to release document lock");
        }
        Err(e)
      }
    }
  }

  async fn load_chain(&self, id: &str) -> Result<(Chain, Option<StoredRecord>)> {
    let records = self.store.list_revisions(id).await.map_err(Error::storage)?;
    let chain = Chain::load(id, records)?;
    let current = self.get_record(id).await?;
    Ok((chain, current))
  }
}
