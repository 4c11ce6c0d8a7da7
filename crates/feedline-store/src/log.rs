use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedline_core::{EventLog, EventRow};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::Result;

/// Same shape SQLite's `CURRENT_TIMESTAMP` produces, plus milliseconds, so
/// rows written here and rows written by triggers sort together.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Change log backed by a single SQLite connection.
///
/// Cloning is cheap and shares the connection. Async reads run on the
/// blocking pool so a slow disk never parks a runtime worker.
#[derive(Clone)]
pub struct SqliteEventLog {
    db: Arc<Mutex<Connection>>,
}

impl SqliteEventLog {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Append an event stamped with the current time. Returns its id.
    pub fn append(&self, entity: &str, event_type: &str, payload: &Value) -> Result<i64> {
        self.append_at(entity, event_type, payload, Utc::now())
    }

    #[instrument(skip(self, payload), fields(entity, event_type))]
    pub fn append_at(
        &self,
        entity: &str,
        event_type: &str,
        payload: &Value,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let payload = serde_json::to_string(payload)?;
        let created_at = created_at.format(TIMESTAMP_FORMAT).to_string();
        let db = lock(&self.db);
        db.execute(
            "INSERT INTO db_events (entity, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![entity, event_type, payload, created_at],
        )?;
        let id = db.last_insert_rowid();
        debug!(id, "event appended");
        Ok(id)
    }

    /// Synchronous form of [`EventLog::fetch`].
    pub fn fetch_after(&self, after_id: i64, limit: usize) -> Result<Vec<EventRow>> {
        query_after(&lock(&self.db), after_id, limit)
    }

    /// Highest id in the log, or `None` when it is empty.
    pub fn latest_id(&self) -> Result<Option<i64>> {
        let db = lock(&self.db);
        let id = db.query_row("SELECT MAX(id) FROM db_events", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(id)
    }

    /// Delete events created before `cutoff`. Returns the number removed.
    ///
    /// Rows whose `created_at` SQLite cannot parse are left alone.
    #[instrument(skip(self), fields(cutoff = %cutoff))]
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.format(TIMESTAMP_FORMAT).to_string();
        let db = lock(&self.db);
        let removed = db.execute(
            "DELETE FROM db_events WHERE datetime(created_at) < datetime(?1)",
            [&cutoff],
        )?;
        if removed > 0 {
            info!(removed, "old events pruned");
        }
        Ok(removed)
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn fetch(&self, after_id: i64, limit: usize) -> feedline_core::Result<Vec<EventRow>> {
        let db = Arc::clone(&self.db);
        let rows = tokio::task::spawn_blocking(move || query_after(&lock(&db), after_id, limit))
            .await
            .map_err(crate::StoreError::from)??;
        Ok(rows)
    }
}

/// A panic while holding the lock cannot leave the connection half-written,
/// so a poisoned mutex is still usable.
fn lock(db: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn query_after(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<EventRow>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(
        "SELECT id, entity, event_type, payload, created_at
         FROM db_events
         WHERE id > ?1
         ORDER BY id ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![after_id, limit], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                entity: lossy_text(row, 1)?,
                event_type: lossy_text(row, 2)?,
                payload: lossy_text(row, 3)?,
                created_at: lossy_text(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Read any column as text. A row with an odd column type must still come
/// back so decoding can flag it as malformed; failing the query here would
/// pin the cursor behind it forever.
fn lossy_text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn seeded(n: usize) -> SqliteEventLog {
        let log = SqliteEventLog::open_in_memory().unwrap();
        for i in 0..n {
            log.append("Order", "insert", &json!({ "n": i })).unwrap();
        }
        log
    }

    #[test]
    fn fetch_is_ascending_exclusive_and_bounded() {
        let log = seeded(10);
        let rows = log.fetch_after(3, 4).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 5, 6, 7]);
    }

    #[test]
    fn fetch_from_lowest_cursor_returns_first_rows() {
        let log = seeded(3);
        let rows = log.fetch_after(i64::MIN, 100).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].entity, "Order");
        assert_eq!(rows[0].decode().unwrap().payload, json!({ "n": 0 }));
    }

    #[test]
    fn fetch_past_tail_is_empty() {
        let log = seeded(3);
        assert!(log.fetch_after(3, 100).unwrap().is_empty());
    }

    #[test]
    fn trigger_style_rows_decode() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        {
            let db = lock(&log.db);
            db.execute(
                "INSERT INTO db_events (entity, event_type, payload) VALUES ('Order', 'insert', '{}')",
                [],
            )
            .unwrap();
        }
        let rows = log.fetch_after(0, 10).unwrap();
        assert!(rows[0].decode().is_ok());
    }

    #[test]
    fn non_text_payload_is_still_fetched() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        {
            let db = lock(&log.db);
            db.execute(
                "INSERT INTO db_events (entity, event_type, payload) VALUES ('Order', 'insert', X'00FF')",
                [],
            )
            .unwrap();
        }
        let rows = log.fetch_after(0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].decode().is_err());
    }

    #[test]
    fn latest_id_tracks_appends() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        assert_eq!(log.latest_id().unwrap(), None);
        log.append("Order", "insert", &json!({})).unwrap();
        let id = log.append("Order", "insert", &json!({})).unwrap();
        assert_eq!(log.latest_id().unwrap(), Some(id));
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        let now = Utc::now();
        log.append_at("Order", "insert", &json!({}), now - Duration::days(10))
            .unwrap();
        let kept = log
            .append_at("Order", "insert", &json!({}), now - Duration::hours(1))
            .unwrap();

        let removed = log.prune_older_than(now - Duration::days(7)).unwrap();
        assert_eq!(removed, 1);
        let ids: Vec<i64> = log.fetch_after(0, 10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![kept]);
    }

    #[tokio::test]
    async fn async_fetch_matches_sync_fetch() {
        let log = seeded(5);
        let rows = EventLog::fetch(&log, 2, 2).await.unwrap();
        assert_eq!(rows, log.fetch_after(2, 2).unwrap());
    }
}
