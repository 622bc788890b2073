//! Behavioural tests for the engine against the in-memory store.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tempora_core::{
  document::{NewRecord, StoredRecord},
  key::RevisionKey,
  memory::{MemoryStore, MemoryStoreError},
  metadata::{Metadata, TemporalMetadata, TemporalStatus},
  policy::VersioningPolicy,
  store::{DocumentQuery, DocumentStore, Precondition, QueryScope, WriteOutcome},
};

use crate::{
  ActivationScheduler, EngineConfig, Error, ManualClock, NewDocument, TemporalEngine,
  TemporalHistory,
};

fn at(month: u32, day: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2012, month, day, 0, 0, 0).unwrap()
}

const ID: &str = "employees/1";

struct Harness {
  engine: Arc<TemporalEngine<MemoryStore>>,
  store:  Arc<MemoryStore>,
  clock:  Arc<ManualClock>,
}

fn harness_with(policy: VersioningPolicy) -> Harness {
  let store = Arc::new(MemoryStore::new());
  let clock = Arc::new(ManualClock::new(at(6, 1)));
  let engine = TemporalEngine::new(store.clone())
    .with_clock(clock.clone())
    .with_policy(policy)
    .with_config(EngineConfig {
      lock_retries: 2,
      lock_backoff: Duration::from_millis(1),
      ..Default::default()
    });
  Harness { engine: Arc::new(engine), store, clock }
}

fn harness() -> Harness { harness_with(VersioningPolicy::all()) }

fn pay(rate: u32) -> NewDocument { NewDocument::new(json!({ "name": "John", "pay_rate": rate })) }

impl Harness {
  async fn save_at(&self, rate: u32, effective: DateTime<Utc>) -> TemporalMetadata {
    self
      .engine
      .save(ID, pay(rate).effective_at(effective))
      .await
      .unwrap()
      .temporal
      .unwrap()
  }

  async fn rate_at(&self, effective: Option<DateTime<Utc>>) -> Option<u64> {
    self
      .engine
      .load(ID, effective)
      .await
      .unwrap()
      .map(|doc| doc.content["pay_rate"].as_u64().unwrap())
  }

  async fn history(&self) -> TemporalHistory {
    let history = self.engine.get_history(ID).await.unwrap();
    assert_chain_consistent(&history);
    history
  }

  async fn intents(&self) -> usize {
    let query = DocumentQuery { scope: QueryScope::Intents, ..Default::default() };
    self.store.query(&query).await.unwrap().len()
  }
}

type Window = (TemporalStatus, DateTime<Utc>, Option<DateTime<Utc>>);

fn windows(history: &TemporalHistory) -> Vec<Window> {
  history
    .revisions
    .iter()
    .map(|t| (t.status, t.effective_start, t.effective_until))
    .collect()
}

/// Live windows never overlap and revision records never carry `Current`.
fn assert_chain_consistent(history: &TemporalHistory) {
  let mut live: Vec<&TemporalMetadata> = history
    .revisions
    .iter()
    .inspect(|t| assert_ne!(t.status, TemporalStatus::Current))
    .filter(|t| t.is_live())
    .collect();
  live.sort_by_key(|t| t.effective_start);
  for pair in live.windows(2) {
    let until = pair[0].effective_until.expect("only the last window is open");
    assert!(until <= pair[1].effective_start, "overlapping windows: {pair:?}");
  }
  for (index, t) in history.revisions.iter().enumerate() {
    assert_eq!(t.revision as usize, index + 1);
  }
}

// ─── Saves ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_without_effective_date_is_current_immediately() {
  let h = harness();
  let outcome = h.engine.save(ID, pay(10)).await.unwrap();
  let temporal = outcome.temporal.unwrap();
  assert_eq!(temporal.revision, 1);
  assert_eq!(temporal.effective_start, at(6, 1));
  assert!(!temporal.pending);

  let doc = h.engine.load(ID, None).await.unwrap().unwrap();
  assert_eq!(doc.id, ID);
  let current = doc.temporal.unwrap();
  assert_eq!(current.status, TemporalStatus::Current);
  assert_eq!(current.revision, 1);
  assert_eq!(current.effective, Some(at(6, 1)));
}

#[tokio::test]
async fn save_in_the_past_is_visible_from_that_date() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;

  assert_eq!(h.rate_at(None).await, Some(10));
  assert_eq!(h.rate_at(Some(at(1, 1))).await, Some(10));
  assert_eq!(h.rate_at(Some(at(1, 1) - chrono::Duration::seconds(1))).await, None);
}

#[tokio::test]
async fn in_order_edits_chain_their_windows() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(20, at(2, 1)).await;
  h.save_at(30, at(3, 1)).await;

  assert_eq!(windows(&h.history().await), vec![
    (TemporalStatus::Revision, at(1, 1), Some(at(2, 1))),
    (TemporalStatus::Revision, at(2, 1), Some(at(3, 1))),
    (TemporalStatus::Revision, at(3, 1), None),
  ]);
  assert_eq!(h.rate_at(Some(at(1, 20))).await, Some(10));
  assert_eq!(h.rate_at(Some(at(2, 1))).await, Some(20));
  assert_eq!(h.rate_at(Some(at(5, 1))).await, Some(30));
  assert_eq!(h.rate_at(None).await, Some(30));
}

#[tokio::test]
async fn truncation_ends_the_old_assertion() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.clock.set(at(6, 2));
  h.save_at(20, at(2, 1)).await;

  let history = h.history().await;
  assert_eq!(history.revisions[0].asserted_start, at(6, 1));
  assert_eq!(history.revisions[0].asserted_until, Some(at(6, 2)));
  assert_eq!(history.revisions[1].asserted_until, None);
}

#[tokio::test]
async fn out_of_order_edit_turns_the_later_revision_into_an_artifact() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(30, at(3, 1)).await;
  h.save_at(20, at(2, 1)).await;

  assert_eq!(windows(&h.history().await), vec![
    (TemporalStatus::Revision, at(1, 1), Some(at(2, 1))),
    (TemporalStatus::Artifact, at(3, 1), None),
    (TemporalStatus::Revision, at(2, 1), None),
  ]);
  assert_eq!(h.rate_at(Some(at(3, 15))).await, Some(20));
  assert_eq!(h.rate_at(None).await, Some(20));

  let artifact = h.engine.get_revision(ID, 2).await.unwrap().unwrap();
  assert_eq!(artifact.content["pay_rate"], json!(30));
  assert_eq!(artifact.temporal.unwrap().status, TemporalStatus::Artifact);
}

#[tokio::test]
async fn same_effective_date_supersedes_the_earlier_save() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(15, at(1, 1)).await;

  assert_eq!(windows(&h.history().await), vec![
    (TemporalStatus::Artifact, at(1, 1), None),
    (TemporalStatus::Revision, at(1, 1), None),
  ]);
  assert_eq!(h.rate_at(Some(at(1, 1))).await, Some(15));
  assert_eq!(h.rate_at(None).await, Some(15));
}

#[tokio::test]
async fn caller_metadata_round_trips_without_temporal_entries() {
  let h = harness();
  let mut metadata = Metadata::new();
  metadata.insert("owner".into(), json!("hr"));
  metadata.insert("temporal-status".into(), json!("artifact"));
  h.engine
    .save(ID, pay(10).with_metadata(metadata))
    .await
    .unwrap();

  let doc = h.engine.load(ID, None).await.unwrap().unwrap();
  assert_eq!(Value::Object(doc.metadata), json!({ "owner": "hr" }));
  assert_eq!(doc.temporal.unwrap().status, TemporalStatus::Current);

  let revision = h.engine.load(ID, Some(at(6, 1))).await.unwrap().unwrap();
  assert_eq!(Value::Object(revision.metadata), json!({ "owner": "hr" }));
  assert_eq!(revision.temporal.unwrap().status, TemporalStatus::Revision);
}

#[tokio::test]
async fn invalid_document_ids_are_rejected() {
  let h = harness();
  let result = h.engine.save("employees/1/temporalrevisions/3", pay(1)).await;
  assert!(matches!(result, Err(Error::Core(_))));
}

// ─── Future revisions and activation ─────────────────────────────────────────

#[tokio::test]
async fn future_revision_stays_pending_until_activated() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  let future = h.save_at(20, at(7, 1)).await;
  assert!(future.pending);

  assert_eq!(h.rate_at(None).await, Some(10));
  assert_eq!(h.rate_at(Some(at(7, 2))).await, Some(20));

  let scheduler = ActivationScheduler::new(h.engine.clone(), Duration::from_secs(5));
  assert_eq!(scheduler.run_once().await.unwrap().activated, 0);
  assert_eq!(h.rate_at(None).await, Some(10));

  h.clock.set(at(7, 2));
  assert_eq!(h.engine.due_documents().await.unwrap(), vec![ID.to_owned()]);
  assert_eq!(scheduler.run_once().await.unwrap().activated, 1);

  let doc = h.engine.load(ID, None).await.unwrap().unwrap();
  let current = doc.temporal.unwrap();
  assert_eq!(doc.content["pay_rate"], json!(20));
  assert_eq!((current.status, current.revision, current.pending), (
    TemporalStatus::Current,
    2,
    false
  ));

  let history = h.history().await;
  assert_eq!(history.revisions[0].effective_until, Some(at(7, 1)));
  assert!(!history.revisions[1].pending);
}

#[tokio::test]
async fn first_save_in_the_future_has_no_current_copy() {
  let h = harness();
  h.save_at(10, at(7, 1)).await;
  assert_eq!(h.rate_at(None).await, None);
  assert_eq!(h.store.len(), 1);

  h.clock.set(at(7, 1));
  assert!(h.engine.activate(ID).await.unwrap());
  assert_eq!(h.rate_at(None).await, Some(10));
}

#[tokio::test]
async fn activation_is_idempotent() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(20, at(7, 1)).await;
  h.clock.set(at(7, 2));

  assert!(h.engine.activate(ID).await.unwrap());
  let snapshot = h.store.list_revisions(ID).await.unwrap();
  let current = h.store.get(ID).await.unwrap();

  assert!(!h.engine.activate(ID).await.unwrap());
  assert_eq!(h.store.list_revisions(ID).await.unwrap(), snapshot);
  assert_eq!(h.store.get(ID).await.unwrap(), current);
  assert!(h.engine.due_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn one_cycle_activates_several_due_revisions() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(20, at(7, 1)).await;
  h.save_at(30, at(8, 1)).await;
  h.clock.set(at(9, 1));

  let scheduler = ActivationScheduler::new(h.engine.clone(), Duration::from_secs(5));
  let report = scheduler.run_once().await.unwrap();
  assert_eq!((report.activated, report.skipped), (1, 0));

  assert_eq!(h.rate_at(None).await, Some(30));
  assert!(h.history().await.revisions.iter().all(|t| !t.pending));
}

#[tokio::test]
async fn shadowed_pending_revision_is_never_activated() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(30, at(8, 1)).await;
  h.save_at(20, at(7, 1)).await;

  let history = h.history().await;
  assert_eq!(history.revisions[1].status, TemporalStatus::Artifact);
  assert!(!history.revisions[1].pending);

  h.clock.set(at(9, 1));
  assert!(h.engine.activate(ID).await.unwrap());
  assert_eq!(h.rate_at(None).await, Some(20));
}

#[tokio::test]
async fn activation_skips_a_locked_document() {
  let h = harness();
  h.save_at(10, at(7, 1)).await;
  h.clock.set(at(7, 2));

  let intent = NewRecord {
    key:      tempora_core::key::intent_key(ID),
    content:  json!({
      "document_id": ID,
      "token": uuid::Uuid::new_v4(),
      "started_at": at(7, 2),
    }),
    metadata: Metadata::new(),
  };
  let _ = h.store.put(intent, Precondition::Missing).await.unwrap();

  let scheduler = ActivationScheduler::new(h.engine.clone(), Duration::from_secs(5));
  let report = scheduler.run_once().await.unwrap();
  assert_eq!((report.activated, report.skipped), (0, 1));
  assert_eq!(h.rate_at(None).await, None);
}

#[tokio::test]
async fn spawned_scheduler_activates_and_stops() {
  let h = harness();
  h.save_at(10, at(7, 1)).await;
  h.clock.set(at(7, 1));

  let handle =
    ActivationScheduler::new(h.engine.clone(), Duration::from_millis(5)).spawn();
  let mut activated = false;
  for _ in 0..200 {
    if h.rate_at(None).await.is_some() {
      activated = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  handle.stop().await;
  assert!(activated);
}

#[tokio::test]
async fn scheduler_restart_keeps_pending_revisions() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;

  let first = ActivationScheduler::new(h.engine.clone(), Duration::from_millis(5)).spawn();
  first.stop().await;

  h.save_at(20, at(7, 1)).await;
  h.clock.set(at(7, 2));
  assert_eq!(h.rate_at(None).await, Some(10));

  let second = ActivationScheduler::new(h.engine.clone(), Duration::from_millis(5)).spawn();
  let mut activated = false;
  for _ in 0..200 {
    if h.rate_at(None).await == Some(20) {
      activated = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  second.stop().await;
  assert!(activated);
  assert!(h.history().await.revisions.iter().all(|t| !t.pending));
}

#[tokio::test]
async fn write_before_activation_promotes_the_due_revision() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(20, at(7, 1)).await;
  h.clock.set(at(7, 2));
  assert_eq!(h.rate_at(None).await, Some(10));

  // The scheduler has not run; the save must not drop the current copy.
  let future = h.save_at(30, at(9, 1)).await;
  assert!(future.pending);

  let doc = h.engine.load(ID, None).await.unwrap().unwrap();
  let current = doc.temporal.unwrap();
  assert_eq!(doc.content["pay_rate"], json!(20));
  assert_eq!((current.status, current.revision), (TemporalStatus::Current, 2));

  let history = h.history().await;
  assert_eq!(windows(&history), vec![
    (TemporalStatus::Revision, at(1, 1), Some(at(7, 1))),
    (TemporalStatus::Revision, at(7, 1), Some(at(9, 1))),
    (TemporalStatus::Revision, at(9, 1), None),
  ]);
  assert!(!history.revisions[1].pending);
  assert_eq!(h.engine.due_documents().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn delete_before_activation_removes_the_promoted_revision() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  h.save_at(20, at(7, 1)).await;
  h.clock.set(at(7, 2));

  let deleted = h.engine.delete(ID, Some(at(8, 1))).await.unwrap().temporal.unwrap();
  assert!(deleted.deleted);
  assert_eq!(h.rate_at(None).await, Some(20));
  assert_eq!(h.rate_at(Some(at(8, 2))).await, None);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_revisions_is_ordered_and_paged() {
  let h = harness();
  for (rate, month) in [(10, 1), (20, 2), (30, 3), (40, 4)] {
    h.save_at(rate, at(month, 1)).await;
  }

  let all = h.engine.list_revisions(ID, 0, None).await.unwrap();
  assert_eq!(all.len(), 4);
  let revisions: Vec<u32> = all.iter().map(|d| d.temporal.as_ref().unwrap().revision).collect();
  assert_eq!(revisions, vec![1, 2, 3, 4]);
  assert!(all.iter().all(|d| d.id == ID));

  let page = h.engine.list_revisions(ID, 1, Some(2)).await.unwrap();
  let rates: Vec<&Value> = page.iter().map(|d| &d.content["pay_rate"]).collect();
  assert_eq!(rates, vec![&json!(20), &json!(30)]);
}

#[tokio::test]
async fn history_of_an_unknown_document_is_not_found() {
  let h = harness();
  assert!(matches!(h.engine.get_history(ID).await, Err(Error::NotFound(_))));
  assert!(h.engine.load(ID, None).await.unwrap().is_none());
  assert!(h.engine.get_revision(ID, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn queries_filter_by_effective_date() {
  let h = harness();
  let dept = |rate: u32| NewDocument::new(json!({ "dept": "a", "pay_rate": rate }));
  h.engine
    .save("employees/1", dept(10).effective_at(at(1, 1)))
    .await
    .unwrap();
  h.engine
    .save("employees/1", dept(11).effective_at(at(4, 1)))
    .await
    .unwrap();
  h.engine
    .save("employees/2", dept(20).effective_at(at(3, 1)))
    .await
    .unwrap();

  let mut query = DocumentQuery::default();
  query.content_equals.insert("dept".into(), json!("a"));

  let in_february = h.engine.query(&query, Some(at(2, 1))).await.unwrap();
  let ids: Vec<&str> = in_february.iter().map(|d| d.id.as_str()).collect();
  assert_eq!(ids, vec!["employees/1"]);
  assert_eq!(in_february[0].content["pay_rate"], json!(10));

  let in_march = h.engine.query(&query, Some(at(3, 15))).await.unwrap();
  let found: Vec<(&str, u32)> = in_march
    .iter()
    .map(|d| (d.id.as_str(), d.temporal.as_ref().unwrap().revision))
    .collect();
  assert_eq!(found, vec![("employees/1", 1), ("employees/2", 1)]);

  let as_stored = h.engine.query(&query, None).await.unwrap();
  assert_eq!(as_stored.len(), 2);
  assert!(
    as_stored
      .iter()
      .all(|d| d.temporal.as_ref().unwrap().status == TemporalStatus::Current)
  );

  let limited = DocumentQuery { limit: Some(1), offset: Some(1), ..query };
  let page = h.engine.query(&limited, Some(at(3, 15))).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].id, "employees/2");
}

// ─── Deletes and unversioned collections ─────────────────────────────────────

#[tokio::test]
async fn soft_delete_hides_the_document_from_that_date() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  let deleted = h.engine.delete(ID, Some(at(3, 1))).await.unwrap().temporal.unwrap();
  assert!(deleted.deleted);
  assert_eq!(deleted.revision, 2);

  assert_eq!(h.rate_at(Some(at(2, 1))).await, Some(10));
  assert_eq!(h.rate_at(Some(at(4, 1))).await, None);
  assert_eq!(h.rate_at(None).await, None);

  let tombstone = h.engine.get_revision(ID, 2).await.unwrap().unwrap();
  assert_eq!(tombstone.content["pay_rate"], json!(10));

  assert!(matches!(h.engine.delete(ID, Some(at(4, 1))).await, Err(Error::NotFound(_))));
  assert_eq!(h.intents().await, 0);

  h.save_at(50, at(5, 1)).await;
  assert_eq!(h.rate_at(None).await, Some(50));
  h.history().await;
}

#[tokio::test]
async fn deleting_an_unknown_document_is_not_found() {
  let h = harness();
  assert!(matches!(h.engine.delete(ID, None).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn unversioned_collections_pass_through() {
  let h = harness_with(VersioningPolicy::only(["employees"]));
  let outcome = h
    .engine
    .save("teams/1", NewDocument::new(json!({ "name": "core" })))
    .await
    .unwrap();
  assert!(outcome.temporal.is_none());
  assert!(h.engine.list_revisions("teams/1", 0, None).await.unwrap().is_empty());

  let doc = h.engine.load("teams/1", Some(at(1, 1))).await.unwrap().unwrap();
  assert_eq!(doc.content, json!({ "name": "core" }));
  assert!(doc.temporal.is_none());

  let everything = h
    .engine
    .query(&DocumentQuery::default(), Some(at(1, 1)))
    .await
    .unwrap();
  assert_eq!(everything.len(), 1);

  h.engine.delete("teams/1", None).await.unwrap();
  assert!(h.engine.load("teams/1", None).await.unwrap().is_none());
  assert!(h.store.is_empty());
}

/// Serves reads from the wrapped store and refuses every write with a
/// precondition conflict.
struct RefusingStore(MemoryStore);

impl DocumentStore for RefusingStore {
  type Error = MemoryStoreError;

  async fn get(&self, key: &str) -> Result<Option<StoredRecord>, Self::Error> {
    self.0.get(key).await
  }

  async fn put(
    &self,
    _record: NewRecord,
    _precondition: Precondition,
  ) -> Result<WriteOutcome, Self::Error> {
    Ok(WriteOutcome::Conflict)
  }

  async fn delete(
    &self,
    _key: &str,
    _precondition: Precondition,
  ) -> Result<WriteOutcome, Self::Error> {
    Ok(WriteOutcome::Conflict)
  }

  async fn list_revisions(&self, document_id: &str) -> Result<Vec<StoredRecord>, Self::Error> {
    self.0.list_revisions(document_id).await
  }

  async fn query(&self, query: &DocumentQuery) -> Result<Vec<StoredRecord>, Self::Error> {
    self.0.query(query).await
  }
}

#[tokio::test]
async fn unversioned_save_reports_a_refused_write() {
  let engine = TemporalEngine::new(Arc::new(RefusingStore(MemoryStore::new())))
    .with_policy(VersioningPolicy::only(["employees"]));
  let result = engine.save("teams/1", NewDocument::new(json!({ "name": "core" }))).await;
  assert!(matches!(result, Err(Error::Conflict(id)) if id == "teams/1"));
  assert!(engine.load("teams/1", None).await.unwrap().is_none());
}

// ─── Atomicity and recovery ──────────────────────────────────────────────────

#[tokio::test]
async fn failed_write_is_rolled_back() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  let before = h.store.list_revisions(ID).await.unwrap();
  let current = h.store.get(ID).await.unwrap();

  // Lock, intent update and the truncation succeed; the new revision fails.
  h.store.fail_once_after(3);
  let result = h.engine.save(ID, pay(20).effective_at(at(2, 1))).await;
  assert!(matches!(result, Err(Error::Storage(_))));

  assert_eq!(h.store.list_revisions(ID).await.unwrap(), before);
  assert_eq!(h.store.get(ID).await.unwrap(), current);
  assert_eq!(h.intents().await, 0);
}

#[tokio::test]
async fn abandoned_write_is_recovered_once_stale() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;
  let before = h.store.list_revisions(ID).await.unwrap();

  h.store.fail_writes_after(3);
  assert!(h.engine.save(ID, pay(20).effective_at(at(2, 1))).await.is_err());
  h.store.heal();

  assert_eq!(h.intents().await, 1);
  assert!(matches!(
    h.engine.save(ID, pay(30)).await,
    Err(Error::Conflict(_))
  ));
  assert_eq!(h.engine.recover_stale_intents().await.unwrap(), 0);

  h.clock.advance(chrono::Duration::seconds(31));
  assert_eq!(h.engine.recover_stale_intents().await.unwrap(), 1);
  assert_eq!(h.store.list_revisions(ID).await.unwrap(), before);
  assert_eq!(h.intents().await, 0);

  h.save_at(20, at(2, 1)).await;
  assert_eq!(h.history().await.revisions.len(), 2);
}

#[tokio::test]
async fn reads_ignore_a_write_that_died_mid_apply() {
  let h = harness();
  h.save_at(10, at(1, 1)).await;

  // The truncation of revision 1 lands; the new revision and the rollback
  // do not, leaving the intent behind.
  h.store.fail_writes_after(3);
  assert!(h.engine.save(ID, pay(20).effective_at(at(2, 1))).await.is_err());
  h.store.heal();
  assert_eq!(h.intents().await, 1);
  let stored = h.store.list_revisions(ID).await.unwrap();
  assert_eq!(stored.len(), 1);
  assert_ne!(
    TemporalMetadata::read_from(&stored[0].metadata).unwrap().unwrap().effective_until,
    None,
  );

  assert_eq!(h.rate_at(Some(at(3, 1))).await, Some(10));
  assert_eq!(h.rate_at(None).await, Some(10));
  let history = h.history().await;
  assert_eq!(windows(&history), vec![(TemporalStatus::Revision, at(1, 1), None)]);

  let listed = h.engine.list_revisions(ID, 0, None).await.unwrap();
  assert_eq!(listed[0].temporal.as_ref().unwrap().effective_until, None);
  let exact = h.engine.get_revision(ID, 1).await.unwrap().unwrap();
  assert_eq!(exact.temporal.unwrap().effective_until, None);

  let mut query = DocumentQuery::default();
  query.content_equals.insert("pay_rate".into(), json!(10));
  let found = h.engine.query(&query, Some(at(3, 1))).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].temporal.as_ref().unwrap().revision, 1);

  h.clock.advance(chrono::Duration::seconds(31));
  assert_eq!(h.engine.recover_stale_intents().await.unwrap(), 1);
  assert_eq!(h.rate_at(Some(at(3, 1))).await, Some(10));
}

#[tokio::test]
async fn non_contiguous_revisions_are_rejected() {
  let h = harness();
  let mut metadata = Metadata::new();
  TemporalMetadata::new_revision(2, at(1, 1), at(1, 1))
    .write_to(&mut metadata)
    .unwrap();
  let stray = NewRecord {
    key: RevisionKey::new(ID, 2).encode(),
    content: json!({}),
    metadata,
  };
  let _ = h.store.put(stray, Precondition::Any).await.unwrap();

  assert!(matches!(
    h.engine.save(ID, pay(10)).await,
    Err(Error::InvalidInterval(_))
  ));
  assert_eq!(h.intents().await, 0);
}
