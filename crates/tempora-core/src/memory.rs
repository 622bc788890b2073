//! [`MemoryStore`]: an in-process [`DocumentStore`].
//!
//! Used as the fake backend when testing the temporal engine. It can be told
//! to start failing writes after a number of successful ones, to exercise the
//! engine's rollback paths.

use std::{
  collections::BTreeMap,
  sync::{Mutex, RwLock},
};

use thiserror::Error;

use crate::{
  document::{NewRecord, StoredRecord},
  etag::compute_etag,
  key::StoreKey,
  store::{DocumentQuery, DocumentStore, Precondition, WriteOutcome},
};

#[derive(Debug, Error)]
pub enum MemoryStoreError {
  #[error("injected write failure")]
  InjectedFault,

  #[error("lock poisoned")]
  Poisoned,

  #[error(transparent)]
  Core(#[from] crate::Error),
}

#[derive(Debug, Clone, Copy)]
struct Fault {
  /// Writes still allowed to succeed before the fault triggers.
  after:      usize,
  /// Keep failing once triggered, rather than failing a single write.
  persistent: bool,
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: RwLock<BTreeMap<String, StoredRecord>>,
  fault:   Mutex<Option<Fault>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Allow `n` more successful writes, then fail every put and delete until
  /// [`MemoryStore::heal`] is called.
  pub fn fail_writes_after(&self, n: usize) {
    self.inject(Some(Fault { after: n, persistent: true }));
  }

  /// Allow `n` more successful writes, then fail exactly one.
  pub fn fail_once_after(&self, n: usize) {
    self.inject(Some(Fault { after: n, persistent: false }));
  }

  /// Stop injecting write failures.
  pub fn heal(&self) { self.inject(None); }

  fn inject(&self, fault: Option<Fault>) {
    if let Ok(mut slot) = self.fault.lock() {
      *slot = fault;
    }
  }

  /// Number of records of every kind.
  pub fn len(&self) -> usize {
    self.records.read().map(|r| r.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn take_write_quota(&self) -> Result<(), MemoryStoreError> {
    let mut fault = self.fault.lock().map_err(|_| MemoryStoreError::Poisoned)?;
    let Some(f) = fault.as_mut() else {
      return Ok(());
    };
    if f.after > 0 {
      f.after -= 1;
      return Ok(());
    }
    if !f.persistent {
      *fault = None;
    }
    Err(MemoryStoreError::InjectedFault)
  }
}

/// Sort key giving document-id-then-revision order.
fn ordering(key: &str) -> (String, u32, String) {
  match StoreKey::parse(key) {
    StoreKey::Revision(rk) => (rk.document_id, rk.revision, String::new()),
    other => (other.document_id().to_owned(), 0, key.to_owned()),
  }
}

impl DocumentStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn get(&self, key: &str) -> Result<Option<StoredRecord>, Self::Error> {
    let records = self.records.read().map_err(|_| MemoryStoreError::Poisoned)?;
    Ok(records.get(key).cloned())
  }

  async fn put(
    &self,
    record: NewRecord,
    precondition: Precondition,
  ) -> Result<WriteOutcome, Self::Error> {
    self.take_write_quota()?;
    let etag = compute_etag(&record.key, &record.content, &record.metadata)?;

    let mut records = self.records.write().map_err(|_| MemoryStoreError::Poisoned)?;
    let current = records.get(&record.key).map(|r| r.etag.as_str());
    if !precondition.holds(current) {
      return Ok(WriteOutcome::Conflict);
    }
    records.insert(record.key.clone(), StoredRecord {
      key:      record.key,
      content:  record.content,
      metadata: record.metadata,
      etag:     etag.clone(),
    });
    Ok(WriteOutcome::Applied(Some(etag)))
  }

  async fn delete(
    &self,
    key: &str,
    precondition: Precondition,
  ) -> Result<WriteOutcome, Self::Error> {
    self.take_write_quota()?;
    let mut records = self.records.write().map_err(|_| MemoryStoreError::Poisoned)?;
    let current = records.get(key).map(|r| r.etag.as_str());
    if !precondition.holds(current) {
      return Ok(WriteOutcome::Conflict);
    }
    records.remove(key);
    Ok(WriteOutcome::Applied(None))
  }

  async fn list_revisions(
    &self,
    document_id: &str,
  ) -> Result<Vec<StoredRecord>, Self::Error> {
    let records = self.records.read().map_err(|_| MemoryStoreError::Poisoned)?;
    let mut revisions: Vec<(u32, StoredRecord)> = records
      .values()
      .filter_map(|r| match StoreKey::parse(&r.key) {
        StoreKey::Revision(rk) if rk.document_id == document_id => {
          Some((rk.revision, r.clone()))
        }
        _ => None,
      })
      .collect();
    revisions.sort_by_key(|(n, _)| *n);
    Ok(revisions.into_iter().map(|(_, r)| r).collect())
  }

  async fn query(
    &self,
    query: &DocumentQuery,
  ) -> Result<Vec<StoredRecord>, Self::Error> {
    let records = self.records.read().map_err(|_| MemoryStoreError::Poisoned)?;
    let mut matched: Vec<StoredRecord> = records
      .values()
      .filter(|r| query.matches(r))
      .cloned()
      .collect();
    matched.sort_by_cached_key(|r| ordering(&r.key));
    Ok(
      matched
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }
}
