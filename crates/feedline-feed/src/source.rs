use std::sync::Arc;
use std::time::Duration;

use feedline_core::config::FeedConfig;
use feedline_core::EventLog;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcaster::{BatchReport, Broadcaster};
use crate::cursor::Cursor;

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new in the log.
    Idle,
    /// A batch was handed to the broadcaster and the cursor moved past it.
    Dispatched(BatchReport),
    /// The log query failed; the cursor did not move.
    SourceFailed,
}

/// Reads the change log forward from a cursor and feeds each batch to the
/// broadcaster.
pub struct EventSource {
    log: Arc<dyn EventLog>,
    broadcaster: Broadcaster,
    cursor: Cursor,
    batch_limit: usize,
    poll_interval: Duration,
}

impl EventSource {
    pub fn new(log: Arc<dyn EventLog>, broadcaster: Broadcaster, config: &FeedConfig) -> Self {
        Self {
            log,
            broadcaster,
            cursor: Cursor::new(config.start_cursor),
            batch_limit: config.batch_limit.max(1),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run one cycle: fetch up to `batch_limit` rows past the cursor,
    /// broadcast them, then advance the cursor to the highest id seen.
    ///
    /// Rows that fail to decode are skipped by the broadcaster but still
    /// count for the cursor, so a bad row cannot pin the feed.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let after = self.cursor.last_delivered_id();
        let mut rows = match self.log.fetch(after, self.batch_limit).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(cursor = after, error = %e, "event log query failed, retrying next cycle");
                return PollOutcome::SourceFailed;
            }
        };

        let before = rows.len();
        rows.retain(|r| r.id > after);
        if rows.len() != before {
            warn!(
                cursor = after,
                dropped = before - rows.len(),
                "event log returned rows at or behind the cursor"
            );
        }
        let Some(max_id) = rows.iter().map(|r| r.id).max() else {
            return PollOutcome::Idle;
        };

        let report = self.broadcaster.broadcast(&rows).await;
        self.cursor.advance(max_id);
        debug!(
            cursor = max_id,
            records = report.records,
            skipped = report.skipped,
            reached = report.reached,
            dropped = report.dropped,
            "batch dispatched"
        );
        PollOutcome::Dispatched(report)
    }

    /// Poll on a fixed interval until `shutdown` is cancelled. Returns the
    /// final cursor.
    ///
    /// A cycle that overruns the interval delays the next one instead of
    /// bunching ticks, so batch N is always fully dispatched before batch
    /// N+1 is fetched.
    pub async fn run(mut self, shutdown: CancellationToken) -> Cursor {
        info!(
            cursor = self.cursor.last_delivered_id(),
            interval_ms = self.poll_interval.as_millis() as u64,
            batch_limit = self.batch_limit,
            "event source started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }

        info!(
            cursor = self.cursor.last_delivered_id(),
            "event source stopped"
        );
        self.cursor
    }
}
