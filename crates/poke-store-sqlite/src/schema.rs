//! SQL schema for the poke SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Timestamps are fixed-width RFC 3339 UTC strings with nanosecond
/// precision, so string comparison in `WHERE` clauses is chronological.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- The active queue.
CREATE TABLE IF NOT EXISTS pokes (
    poke_id       TEXT PRIMARY KEY,
    tunnel        TEXT NOT NULL,   -- 'sms' | 'email' | 'voice'
    \"to\"          TEXT NOT NULL,
    subject       TEXT,
    body          TEXT NOT NULL,
    date_to_send  TEXT NOT NULL,
    expiry        TEXT NOT NULL,
    claimed_by    TEXT,
    claimed_until TEXT
);

-- Rows are only ever inserted (by archive) or deleted (by purge).
CREATE TABLE IF NOT EXISTS archived_pokes (
    poke_id     TEXT PRIMARY KEY,
    tunnel      TEXT NOT NULL,
    \"to\"        TEXT NOT NULL,
    expired     INTEGER NOT NULL,
    archived_at TEXT NOT NULL
);

-- Append-only delivery log.
CREATE TABLE IF NOT EXISTS records (
    record_id  TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    status     TEXT NOT NULL,
    timestamp  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS pokes_send_idx      ON pokes(date_to_send);
CREATE INDEX IF NOT EXISTS pokes_expiry_idx    ON pokes(expiry);
CREATE INDEX IF NOT EXISTS records_message_idx ON records(message_id, timestamp);

PRAGMA user_version = 1;
";
