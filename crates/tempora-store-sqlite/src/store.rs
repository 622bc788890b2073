//! [`SqliteStore`]: the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use tempora_core::{
  document::{NewRecord, StoredRecord},
  etag::compute_etag,
  store::{DocumentQuery, DocumentStore, Precondition, QueryScope, WriteOutcome},
};

use crate::{
  Result,
  encode::{RawRecord, encode_dt, encode_scope, json_member_path, key_columns},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Read the ETag stored under `key` inside an open transaction.
fn current_etag(
  tx: &rusqlite::Transaction<'_>,
  key: &str,
) -> rusqlite::Result<Option<String>> {
  tx.query_row(
    "SELECT etag FROM records WHERE key = ?1",
    rusqlite::params![key],
    |row| row.get(0),
  )
  .optional()
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = crate::Error;

  async fn get(&self, key: &str) -> Result<Option<StoredRecord>> {
    let key = key.to_owned();
    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM records WHERE key = ?1", RawRecord::COLUMNS);
        Ok(
          conn
            .query_row(&sql, rusqlite::params![key], RawRecord::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn put(&self, record: NewRecord, precondition: Precondition) -> Result<WriteOutcome> {
    let etag = compute_etag(&record.key, &record.content, &record.metadata)?;
    let (kind, document_id, revision) = key_columns(&record.key);
    let content = record.content.to_string();
    let metadata = serde_json::Value::Object(record.metadata).to_string();
    let updated_at = encode_dt(Utc::now());
    let key = record.key;

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !precondition.holds(current_etag(&tx, &key)?.as_deref()) {
          return Ok(None);
        }
        tx.execute(
          "INSERT INTO records (
             key, kind, document_id, revision, content, metadata, etag, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(key) DO UPDATE SET
             content    = excluded.content,
             metadata   = excluded.metadata,
             etag       = excluded.etag,
             updated_at = excluded.updated_at",
          rusqlite::params![
            key,
            kind,
            document_id,
            revision,
            content,
            metadata,
            etag,
            updated_at,
          ],
        )?;
        tx.commit()?;
        Ok(Some(etag))
      })
      .await?;

    Ok(match applied {
      Some(etag) => WriteOutcome::Applied(Some(etag)),
      None => WriteOutcome::Conflict,
    })
  }

  async fn delete(&self, key: &str, precondition: Precondition) -> Result<WriteOutcome> {
    let key = key.to_owned();
    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !precondition.holds(current_etag(&tx, &key)?.as_deref()) {
          return Ok(false);
        }
        tx.execute("DELETE FROM records WHERE key = ?1", rusqlite::params![key])?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(if applied { WriteOutcome::Applied(None) } else { WriteOutcome::Conflict })
  }

  async fn list_revisions(&self, document_id: &str) -> Result<Vec<StoredRecord>> {
    let document_id = document_id.to_owned();
    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM records
           WHERE kind = ?1 AND document_id = ?2
           ORDER BY revision",
          RawRecord::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![encode_scope(QueryScope::Revisions), document_id],
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn query(&self, query: &DocumentQuery) -> Result<Vec<StoredRecord>> {
    // Build the WHERE clause with numbered parameters.
    let mut params: Vec<SqlValue> =
      vec![SqlValue::Text(encode_scope(query.scope).to_owned())];
    let mut conds: Vec<String> = vec!["kind = ?1".to_owned()];

    if let Some(prefix) = &query.id_prefix {
      params.push(SqlValue::Text(prefix.clone()));
      let n = params.len();
      conds.push(format!("substr(document_id, 1, length(?{n})) = ?{n}"));
    }
    let filters = [
      ("content", &query.content_equals),
      ("metadata", &query.metadata_equals),
    ];
    for (column, fields) in filters {
      for (name, value) in fields {
        params.push(SqlValue::Text(json_member_path(name)));
        params.push(SqlValue::Text(value.to_string()));
        let n = params.len();
        // Numbers compare by value (`10` IS `10.0`), matching
        // `DocumentQuery::matches`. Booleans extract as 0/1, so their JSON
        // type is compared too; a missing member counts as `null`.
        conds.push(format!(
          "json_extract({column}, ?{path}) IS json_extract(?{n}, '$')
           AND (coalesce(json_type({column}, ?{path}), 'null') IN ('true', 'false'))
             = (json_type(?{n}, '$') IN ('true', 'false'))",
          path = n - 1
        ));
      }
    }

    params.push(SqlValue::Integer(query.limit.map_or(-1, |l| l as i64)));
    params.push(SqlValue::Integer(query.offset.unwrap_or(0) as i64));
    let n = params.len();
    let sql = format!(
      "SELECT {} FROM records
       WHERE {}
       ORDER BY document_id, COALESCE(revision, 0), key
       LIMIT ?{} OFFSET ?{n}",
      RawRecord::COLUMNS,
      conds.join(" AND "),
      n - 1,
    );

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }
}
