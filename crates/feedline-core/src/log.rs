use async_trait::async_trait;

use crate::error::Result;
use crate::types::EventRow;

/// Query interface to the append-only change log.
///
/// The store behind it is owned by whoever writes the events; the feed only
/// ever reads forward from a cursor.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Rows with `id > after_id`, ascending by id, at most `limit` of them.
    ///
    /// Implementations must never return an id less than or equal to
    /// `after_id`. Failures are reported as [`FeedlineError::Source`](crate::FeedlineError::Source)
    /// and are treated as transient by the caller.
    async fn fetch(&self, after_id: i64, limit: usize) -> Result<Vec<EventRow>>;
}
