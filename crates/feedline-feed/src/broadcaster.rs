use std::sync::Arc;
use std::time::Duration;

use feedline_core::EventRow;
use feedline_protocol::WireMessage;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::handle::{Delivery, DeliveryFailure, SubscriberHandle};
use crate::registry::SubscriberRegistry;

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows handed in.
    pub records: usize,
    /// Rows skipped because they could not be decoded.
    pub skipped: usize,
    /// Subscribers that received every message of the batch.
    pub reached: usize,
    /// Subscribers dropped after a failed send.
    pub dropped: usize,
}

/// Fans batches out to every subscriber in a registry snapshot.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `batch`, in order, to the subscribers registered right now.
    ///
    /// The snapshot is taken once per batch. Each subscriber is fed
    /// concurrently with the others; within one subscriber messages go out
    /// in batch order and the first failed send drops it for the rest of
    /// the batch and for good.
    pub async fn broadcast(&self, batch: &[EventRow]) -> BatchReport {
        let mut report = BatchReport {
            records: batch.len(),
            ..BatchReport::default()
        };

        let messages = encode_batch(batch, &mut report);
        if messages.is_empty() {
            return report;
        }

        let subscribers = self.registry.snapshot();
        let outcomes = join_all(
            subscribers
                .iter()
                .map(|handle| self.deliver_all(handle, &messages)),
        )
        .await;

        for delivered in outcomes {
            if delivered {
                report.reached += 1;
            } else {
                report.dropped += 1;
            }
        }
        report
    }

    /// Send every message to one subscriber. Returns `false` if it was
    /// dropped along the way.
    async fn deliver_all(&self, handle: &Arc<SubscriberHandle>, messages: &[Arc<str>]) -> bool {
        for message in messages {
            match handle.deliver(Arc::clone(message), self.send_timeout).await {
                Delivery::Delivered => {}
                Delivery::Failed(failure) => {
                    self.drop_subscriber(handle, failure);
                    return false;
                }
            }
        }
        true
    }

    fn drop_subscriber(&self, handle: &SubscriberHandle, failure: DeliveryFailure) {
        // remove before closing so no snapshot sees a closed member
        self.registry.remove(handle.id());
        handle.close();
        match failure {
            DeliveryFailure::Closed => {
                info!(subscriber = %handle.id(), "subscriber gone, dropped from feed")
            }
            DeliveryFailure::TimedOut { ms } => {
                warn!(subscriber = %handle.id(), timeout_ms = ms, "slow subscriber dropped")
            }
        }
    }
}

/// Decode and serialize each row once; the same text goes to every
/// subscriber.
fn encode_batch(batch: &[EventRow], report: &mut BatchReport) -> Vec<Arc<str>> {
    let mut messages = Vec::with_capacity(batch.len());
    for row in batch {
        let text = row
            .decode()
            .and_then(|record| Ok(WireMessage::from_record(&record).to_text()?));
        match text {
            Ok(text) => messages.push(Arc::from(text)),
            Err(e) => {
                warn!(id = row.id, entity = %row.entity, error = %e, "skipping malformed event");
                report.skipped += 1;
            }
        }
    }
    messages
}
