use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{FeedlineError, Result};

/// Identity of one live subscriber connection (UUIDv7, so ids sort by
/// connect time in logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the change log exactly as stored.
///
/// `payload` and `created_at` are kept as text until [`EventRow::decode`] so
/// a single bad row can be skipped without failing the whole fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub id: i64,
    pub entity: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: String,
}

/// A decoded change-log entry. Immutable once read; `id` is the ordering
/// and dedup key.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub entity: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    /// Parse the stored payload and timestamp.
    pub fn decode(&self) -> Result<EventRecord> {
        let payload = serde_json::from_str(&self.payload).map_err(|e| {
            FeedlineError::MalformedEvent {
                id: self.id,
                reason: format!("payload is not valid JSON: {e}"),
            }
        })?;
        let created_at =
            parse_timestamp(&self.created_at).ok_or_else(|| FeedlineError::MalformedEvent {
                id: self.id,
                reason: format!("unrecognised created_at {:?}", self.created_at),
            })?;
        Ok(EventRecord {
            id: self.id,
            entity: self.entity.clone(),
            event_type: self.event_type.clone(),
            payload,
            created_at,
        })
    }
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` form
/// (`YYYY-MM-DD HH:MM:SS[.fff]`, always UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
