//! [`ContentItemRepository`] over SQLite.
//!
//! One row per item, flat column list matching the persisted item schema.
//! JSON-typed fields (payloads, attempt history) are stored as JSON text.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, ToSql};
use uuid::Uuid;

use pipeline::{
    Attempt, BatchFilter, CategorySlug, ContentItem, ContentItemId, ContentItemRepository,
    GenerationCost, ItemStatus, ModelId, PublishedReference, StoreError, Timestamp,
};

use crate::{backend, SqliteStore};

fn ts_to_str(ts: Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}

fn str_to_ts(s: &str, item: ContentItemId) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Timestamp::from_utc(dt.with_timezone(&Utc)))
        .map_err(|e| StoreError::Corrupt {
            item,
            message: format!("timestamp {s:?}: {e}"),
        })
}

fn opt_ts(s: Option<String>, item: ContentItemId) -> Result<Option<Timestamp>, StoreError> {
    s.map(|s| str_to_ts(&s, item)).transpose()
}

fn corrupt(item: ContentItemId, message: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        item,
        message: message.to_string(),
    }
}

fn row_to_item(row: &Row<'_>) -> Result<ContentItem, StoreError> {
    let id_text: String = row.get(0).map_err(backend)?;
    let id = Uuid::parse_str(&id_text)
        .map(ContentItemId::from_uuid)
        .map_err(|e| StoreError::Backend {
            message: format!("item id {id_text:?}: {e}"),
        })?;

    let status_text: String = row.get(1).map_err(backend)?;
    let status = ItemStatus::parse(&status_text)
        .ok_or_else(|| corrupt(id, format!("unknown status {status_text:?}")))?;

    let source_text: String = row.get(2).map_err(backend)?;
    let source_payload = serde_json::from_str(&source_text).map_err(|e| corrupt(id, e))?;

    let generated_text: Option<String> = row.get(3).map_err(backend)?;
    let generated_payload = generated_text
        .map(|t| serde_json::from_str(&t).map_err(|e| corrupt(id, e)))
        .transpose()?;

    let attempts_text: String = row.get(4).map_err(backend)?;
    let attempts: Vec<Attempt> =
        serde_json::from_str(&attempts_text).map_err(|e| corrupt(id, e))?;

    let model_text: Option<String> = row.get(6).map_err(backend)?;
    let cost_raw: f64 = row.get(7).map_err(backend)?;
    let category_text: Option<String> = row.get(8).map_err(backend)?;
    let reference_text: Option<String> = row.get(14).map_err(backend)?;

    Ok(ContentItem {
        id,
        status,
        source_payload,
        generated_payload,
        attempts,
        retry_count: row.get(5).map_err(backend)?,
        model_used: model_text.and_then(ModelId::new),
        cost: GenerationCost::new(cost_raw)
            .ok_or_else(|| corrupt(id, format!("cost {cost_raw}")))?,
        category: category_text.and_then(CategorySlug::new),
        created_at: str_to_ts(&row.get::<_, String>(9).map_err(backend)?, id)?,
        generation_started_at: opt_ts(row.get(10).map_err(backend)?, id)?,
        generated_at: opt_ts(row.get(11).map_err(backend)?, id)?,
        validated_at: opt_ts(row.get(12).map_err(backend)?, id)?,
        published_at: opt_ts(row.get(13).map_err(backend)?, id)?,
        published_reference: reference_text.and_then(PublishedReference::new),
        last_attempt_at: opt_ts(row.get(15).map_err(backend)?, id)?,
        error: row.get(16).map_err(backend)?,
    })
}

const COLUMNS: &str = "id, status, source_payload, generated_payload, attempts, retry_count, \
     model_used, cost, category, created_at, generation_started_at, generated_at, \
     validated_at, published_at, published_reference, last_attempt_at, error";

fn item_params(item: &ContentItem) -> Result<Vec<Box<dyn ToSql>>, StoreError> {
    let attempts = serde_json::to_string(&item.attempts).map_err(|e| corrupt(item.id, e))?;
    Ok(vec![
        Box::new(item.id.as_uuid().to_string()),
        Box::new(item.status.as_str()),
        Box::new(item.source_payload.to_string()),
        Box::new(item.generated_payload.as_ref().map(|p| p.to_string())),
        Box::new(attempts),
        Box::new(item.retry_count),
        Box::new(item.model_used.as_ref().map(|m| m.as_str().to_owned())),
        Box::new(item.cost.as_f64()),
        Box::new(item.category.as_ref().map(|c| c.as_str().to_owned())),
        Box::new(ts_to_str(item.created_at)),
        Box::new(item.generation_started_at.map(ts_to_str)),
        Box::new(item.generated_at.map(ts_to_str)),
        Box::new(item.validated_at.map(ts_to_str)),
        Box::new(item.published_at.map(ts_to_str)),
        Box::new(item.published_reference.as_ref().map(|r| r.as_str().to_owned())),
        Box::new(item.last_attempt_at.map(ts_to_str)),
        Box::new(item.error.clone()),
    ])
}

fn exec_with_item(
    conn: &Connection,
    sql: &str,
    item: &ContentItem,
    extra: &[&dyn ToSql],
) -> Result<usize, StoreError> {
    let owned = item_params(item)?;
    let mut params: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
    params.extend_from_slice(extra);
    conn.execute(sql, params.as_slice()).map_err(backend)
}

impl ContentItemRepository for SqliteStore {
    fn insert(&self, item: &ContentItem) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            exec_with_item(
                conn,
                &format!(
                    "INSERT INTO content_items ({COLUMNS}) VALUES \
                     (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
                ),
                item,
                &[],
            )?;
            Ok(())
        })
    }

    fn get(&self, id: ContentItemId) -> Result<Option<ContentItem>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {COLUMNS} FROM content_items WHERE id = ?1"))
                .map_err(backend)?;
            let mut rows = stmt
                .query([id.as_uuid().to_string()])
                .map_err(backend)?;
            match rows.next().map_err(backend)? {
                Some(row) => Ok(Some(row_to_item(row)?)),
                None => Ok(None),
            }
        })
    }

    fn update_guarded(&self, item: &ContentItem, expected: ItemStatus) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = exec_with_item(
                conn,
                "UPDATE content_items SET \
                 status=?2, source_payload=?3, generated_payload=?4, attempts=?5, \
                 retry_count=?6, model_used=?7, cost=?8, category=?9, created_at=?10, \
                 generation_started_at=?11, generated_at=?12, validated_at=?13, \
                 published_at=?14, published_reference=?15, last_attempt_at=?16, error=?17 \
                 WHERE id=?1 AND status=?18",
                item,
                &[&expected.as_str()],
            )?;
            match changed {
                1 => Ok(()),
                _ => {
                    // Distinguish a lost race from a missing row.
                    if self.exists(conn, item.id)? {
                        Err(StoreError::GuardFailed {
                            item: item.id,
                            expected,
                        })
                    } else {
                        Err(StoreError::NotFound { item: item.id })
                    }
                }
            }
        })
    }

    fn select_batch(
        &self,
        filter: &BatchFilter,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError> {
        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn ToSql>> = Vec::new();

            if filter.only_failed {
                clauses.push("(status = 'failed' AND retry_count < ?)".to_owned());
                params.push(Box::new(filter.max_retries));
            } else {
                let mut eligible = "status IN ('pending', 'retrying') \
                     OR (status = 'failed' AND retry_count < ?)"
                    .to_owned();
                params.push(Box::new(filter.max_retries));
                if filter.include_generated {
                    eligible.push_str(" OR status = 'generated'");
                }
                clauses.push(format!("({eligible})"));
            }

            if let Some(category) = &filter.category {
                clauses.push("category = ?".to_owned());
                params.push(Box::new(category.as_str().to_owned()));
            }

            params.push(Box::new(limit as i64));
            let sql = format!(
                "SELECT {COLUMNS} FROM content_items WHERE {} \
                 ORDER BY created_at ASC LIMIT ?",
                clauses.join(" AND ")
            );

            let mut stmt = conn.prepare(&sql).map_err(backend)?;
            let refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
            let mut rows = stmt.query(refs.as_slice()).map_err(backend)?;
            let mut items = Vec::new();
            while let Some(row) = rows.next().map_err(backend)? {
                items.push(row_to_item(row)?);
            }
            Ok(items)
        })
    }

    fn delete_terminal_older_than(
        &self,
        cutoff: Timestamp,
        max_retries: u32,
    ) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM content_items WHERE created_at < ?1 AND \
                 (status = 'published' OR (status = 'failed' AND retry_count >= ?2))",
                rusqlite::params![ts_to_str(cutoff), max_retries],
            )
            .map_err(backend)
        })
    }

    fn count_unpublished(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM content_items WHERE status IN ('generated', 'validated')",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(backend)
        })
    }
}

impl SqliteStore {
    fn exists(&self, conn: &Connection, id: ContentItemId) -> Result<bool, StoreError> {
        conn.query_row(
            "SELECT COUNT(*) FROM content_items WHERE id = ?1",
            [id.as_uuid().to_string()],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
        .map_err(backend)
    }
}
