//! [`AcquisitionStore`] over SQLite: the rate limiter's shared timestamp
//! table with compare-and-set semantics.

use chrono::{DateTime, Utc};

use pipeline::{AcquisitionStore, LimiterKey, StoreError, Timestamp};

use crate::{backend, SqliteStore};

impl AcquisitionStore for SqliteStore {
    fn last_acquired(&self, key: &LimiterKey) -> Result<Option<Timestamp>, StoreError> {
        self.with_conn(|conn| {
            let text: Option<String> = conn
                .query_row(
                    "SELECT last_acquired_at FROM acquisitions WHERE key = ?1",
                    [key.as_str()],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(backend(other)),
                })?;
            text.map(|t| {
                DateTime::parse_from_rfc3339(&t)
                    .map(|dt| Timestamp::from_utc(dt.with_timezone(&Utc)))
                    .map_err(|e| StoreError::Backend {
                        message: format!("acquisition timestamp {t:?}: {e}"),
                    })
            })
            .transpose()
        })
    }

    fn record(
        &self,
        key: &LimiterKey,
        prev_seen: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let now_text = now.as_datetime().to_rfc3339();
            let changed = match prev_seen {
                None => conn
                    .execute(
                        "INSERT INTO acquisitions (key, last_acquired_at) VALUES (?1, ?2) \
                         ON CONFLICT(key) DO NOTHING",
                        rusqlite::params![key.as_str(), now_text],
                    )
                    .map_err(backend)?,
                Some(prev) => conn
                    .execute(
                        "UPDATE acquisitions SET last_acquired_at = ?3 \
                         WHERE key = ?1 AND last_acquired_at = ?2",
                        rusqlite::params![
                            key.as_str(),
                            prev.as_datetime().to_rfc3339(),
                            now_text
                        ],
                    )
                    .map_err(backend)?,
            };
            Ok(changed == 1)
        })
    }
}
