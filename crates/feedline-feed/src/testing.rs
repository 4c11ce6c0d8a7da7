//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use feedline_core::{EventLog, EventRow, FeedlineError};
use feedline_protocol::WireMessage;

use crate::handle::Outbox;

pub fn row(id: i64) -> EventRow {
    EventRow {
        id,
        entity: "Order".into(),
        event_type: "insert".into(),
        payload: format!(r#"{{"seq":{id}}}"#),
        created_at: "2024-01-01 00:00:00".into(),
    }
}

/// Everything currently queued for a subscriber, parsed.
pub fn drain(outbox: &mut Outbox) -> Vec<WireMessage> {
    std::iter::from_fn(|| outbox.try_next())
        .map(|text| serde_json::from_str(&text).unwrap())
        .collect()
}

/// In-memory log honouring the fetch contract, with a switch to simulate
/// the store being unreachable.
#[derive(Default)]
pub struct MemoryLog {
    rows: Mutex<Vec<EventRow>>,
    failing: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MemoryLog {
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let log = Self::default();
        log.push(ids.into_iter().map(row));
        log
    }

    pub fn push(&self, rows: impl IntoIterator<Item = EventRow>) {
        self.rows.lock().unwrap().extend(rows);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn fetch(&self, after_id: i64, limit: usize) -> feedline_core::Result<Vec<EventRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedlineError::Source("connection refused".into()));
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.id > after_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
