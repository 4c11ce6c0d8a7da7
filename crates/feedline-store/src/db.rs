use rusqlite::Connection;

use crate::error::Result;

/// Initialise the change log table and its indexes.
///
/// Safe to call on every startup: uses `IF NOT EXISTS` throughout.
/// Producers append rows (directly or from triggers on their own tables);
/// `id` is the only ordering the feed relies on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS db_events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            entity      TEXT NOT NULL,
            event_type  TEXT NOT NULL,
            payload     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_db_events_created_at
            ON db_events(created_at);
        CREATE INDEX IF NOT EXISTS idx_db_events_entity
            ON db_events(entity);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO db_events (entity, event_type, payload) VALUES ('Order', 'insert', '{}')",
            [],
        )
        .unwrap();
        init_db(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM db_events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
