//! SQLite persistence adapters for the Autopress pipeline.
//!
//! Cross-process state (content items, per-job leases, limiter acquisition
//! timestamps) lives in one SQLite file shared by every scheduled process.
//! WAL mode plus a busy timeout handles concurrent invocations; the
//! atomicity boundaries the domain relies on (status-guarded updates, lease
//! steal, acquisition compare-and-set) are single statements or immediate
//! transactions.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Implements [`pipeline::ContentItemRepository`],
//! [`pipeline::LeaseStore`], and [`pipeline::AcquisitionStore`]. No domain
//! rules here.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use pipeline::StoreError;

pub mod acquisitions;
pub mod items;
pub mod leases;
pub mod migrations;

/// Owns the connection and implements all three persistence ports.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the shared database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(backend)?;
        conn.pragma_update(None, "busy_timeout", 5_000).map_err(backend)?;
        migrations::run_migrations(&conn).map_err(backend)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        migrations::run_migrations(&conn).map_err(backend)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Backend {
            message: "connection mutex poisoned".to_owned(),
        })?;
        f(&conn)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Backend {
            message: "connection mutex poisoned".to_owned(),
        })?;
        f(&mut conn)
    }
}

/// Maps engine failures onto the domain's store error.
pub(crate) fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend { message: e.to_string() }
}
