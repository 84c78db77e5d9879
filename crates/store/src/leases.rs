//! [`LeaseStore`] over SQLite: acquire-with-TTL, release-or-expire.
//!
//! The steal of an expired row happens inside one immediate transaction,
//! which is the cross-process atomicity boundary; SQLite's file lock
//! serializes competing stealers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use tracing::debug;
use uuid::Uuid;

use pipeline::{JobName, Lease, LeaseStore, StoreError, Timestamp};

use crate::{backend, SqliteStore};

impl LeaseStore for SqliteStore {
    fn acquire(
        &self,
        name: &JobName,
        ttl: Duration,
        now: Timestamp,
    ) -> Result<Option<Lease>, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let held: Option<String> = tx
                .query_row(
                    "SELECT expires_at FROM leases WHERE name = ?1",
                    [name.as_str()],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(backend(other)),
                })?;

            if let Some(expires_text) = held {
                let expires = DateTime::parse_from_rfc3339(&expires_text)
                    .map(|dt| Timestamp::from_utc(dt.with_timezone(&Utc)))
                    .map_err(|e| StoreError::Backend {
                        message: format!("lease expiry {expires_text:?}: {e}"),
                    })?;
                if now < expires {
                    // A live holder; back off.
                    return Ok(None);
                }
                debug!(job = %name, "stealing expired lease");
            }

            let lease = Lease {
                name: name.clone(),
                token: Uuid::new_v4(),
                expires_at: now.plus(ttl),
            };
            tx.execute(
                "INSERT INTO leases (name, token, expires_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET token = ?2, expires_at = ?3",
                rusqlite::params![
                    lease.name.as_str(),
                    lease.token.to_string(),
                    lease.expires_at.as_datetime().to_rfc3339()
                ],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)?;
            Ok(Some(lease))
        })
    }

    fn release(&self, lease: &Lease) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            // Token match means a stolen or expired lease releases as a no-op.
            conn.execute(
                "DELETE FROM leases WHERE name = ?1 AND token = ?2",
                rusqlite::params![lease.name.as_str(), lease.token.to_string()],
            )
            .map_err(backend)?;
            Ok(())
        })
    }
}
