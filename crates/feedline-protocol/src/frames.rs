use chrono::SecondsFormat;
use feedline_core::EventRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server → subscriber change notification, one text frame per event.
/// Wire: `{ "entity": "Order", "event_type": "insert", "data": {...}, "timestamp": "2024-03-01T12:30:05.000Z" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub entity: String,
    pub event_type: String,
    pub data: Value,
    /// `created_at` of the source record in RFC 3339, UTC.
    pub timestamp: String,
}

impl WireMessage {
    pub fn from_record(record: &EventRecord) -> Self {
        Self {
            entity: record.entity.clone(),
            event_type: record.event_type.clone(),
            data: record.payload.clone(),
            timestamp: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
