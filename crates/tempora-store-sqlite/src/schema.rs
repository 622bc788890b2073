//! SQL schema for the Tempora SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per store key. `kind`, `document_id` and `revision` are derived
-- from the key on write so that range scans never parse keys.
CREATE TABLE IF NOT EXISTS records (
    key          TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,      -- 'document' | 'revision' | 'intent'
    document_id  TEXT NOT NULL,
    revision     INTEGER,            -- NULL unless kind = 'revision'
    content      TEXT NOT NULL,      -- JSON
    metadata     TEXT NOT NULL,      -- JSON object
    etag         TEXT NOT NULL,
    updated_at   TEXT NOT NULL       -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS records_document_idx ON records(document_id, revision);
CREATE INDEX IF NOT EXISTS records_kind_idx     ON records(kind);

PRAGMA user_version = 1;
";
