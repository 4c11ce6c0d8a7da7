//! Background sweeper that deletes old rows from the event log.
//!
//! Only spawned when `retention.enabled` is set. Deleting rows the feed has
//! not reached yet is harmless for delivery order: ids never repeat, so the
//! cursor simply finds the next surviving row.

use chrono::Utc;
use feedline_core::config::RetentionConfig;
use feedline_store::SqliteEventLog;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sweep once per `sweep_interval` until `shutdown` is cancelled.
pub async fn run(log: SqliteEventLog, config: RetentionConfig, shutdown: CancellationToken) {
    info!(
        max_age_days = config.max_age_days,
        every_secs = config.sweep_interval().as_secs(),
        "retention sweeper started"
    );

    let mut interval = tokio::time::interval(config.sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = sweep_once(&log, &config).await {
                    warn!(error = %e, "retention sweep failed");
                }
            }
        }
    }
    info!("retention sweeper stopped");
}

/// Delete everything older than `max_age`. Runs on the blocking pool.
pub async fn sweep_once(log: &SqliteEventLog, config: &RetentionConfig) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - config.max_age();
    let log = log.clone();
    let removed = tokio::task::spawn_blocking(move || log.prune_older_than(cutoff)).await??;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn sweep_removes_rows_past_max_age() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        let now = Utc::now();
        log.append_at("Order", "insert", &json!({}), now - Duration::days(30))
            .unwrap();
        log.append_at("Order", "insert", &json!({}), now - Duration::days(8))
            .unwrap();
        let fresh = log.append("Order", "update", &json!({})).unwrap();

        let removed = sweep_once(&log, &RetentionConfig::default()).await.unwrap();

        assert_eq!(removed, 2);
        let ids: Vec<i64> = log.fetch_after(0, 10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![fresh]);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let log = SqliteEventLog::open_in_memory().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(log, RetentionConfig::default(), shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
