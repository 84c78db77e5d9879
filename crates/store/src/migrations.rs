//! Schema migrations, tracked with `PRAGMA user_version`.
//!
//! Each entry runs exactly once, in order; the pragma records how far a
//! database has come. New schema changes append a new entry, never edit an
//! old one.

use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    // v1: content items, flat field list per the persisted item schema.
    "CREATE TABLE content_items (
        id                    TEXT PRIMARY KEY,
        status                TEXT NOT NULL,
        source_payload        TEXT NOT NULL,
        generated_payload     TEXT,
        attempts              TEXT NOT NULL DEFAULT '[]',
        retry_count           INTEGER NOT NULL DEFAULT 0,
        model_used            TEXT,
        cost                  REAL NOT NULL DEFAULT 0,
        category              TEXT,
        created_at            TEXT NOT NULL,
        generation_started_at TEXT,
        generated_at          TEXT,
        validated_at          TEXT,
        published_at          TEXT,
        published_reference   TEXT,
        last_attempt_at       TEXT,
        error                 TEXT
    );
    CREATE INDEX idx_items_status_created ON content_items(status, created_at);",
    // v2: cross-process leases and limiter acquisition timestamps.
    "CREATE TABLE leases (
        name       TEXT PRIMARY KEY,
        token      TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );
    CREATE TABLE acquisitions (
        key              TEXT PRIMARY KEY,
        last_acquired_at TEXT NOT NULL
    );",
];

/// Brings `conn` up to the current schema version.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for (index, script) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as i64;
        if version > current {
            conn.execute_batch(script)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }
    Ok(())
}
