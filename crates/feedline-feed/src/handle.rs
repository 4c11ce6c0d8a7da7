use std::sync::Arc;
use std::time::Duration;

use feedline_core::SubscriberId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Why a message did not reach a subscriber. Either way the subscriber is
/// dropped; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The connection side is gone or the handle was closed.
    #[error("subscriber closed")]
    Closed,

    /// The subscriber's queue stayed full for the whole send timeout.
    #[error("send timed out after {ms}ms")]
    TimedOut { ms: u64 },
}

/// Outcome of one send to one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(DeliveryFailure),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// One live subscriber as seen by the feed: an id, a bounded outbound queue
/// and a close signal.
///
/// The connection that created the handle owns its [`Outbox`] and writes
/// whatever arrives there to the transport. The registry and broadcaster
/// only ever hold `Arc`s to the handle.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
}

/// Receiving half of a [`SubscriberHandle`], owned by the connection task.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Arc<str>>,
    closed: CancellationToken,
}

impl SubscriberHandle {
    /// Create a handle with room for `buffer` queued messages.
    ///
    /// The close signal is a child of `shutdown`, so cancelling the process
    /// token closes every handle at once.
    pub fn new(buffer: usize, shutdown: &CancellationToken) -> (Arc<Self>, Outbox) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let closed = shutdown.child_token();
        let handle = Arc::new(Self {
            id: SubscriberId::new(),
            tx,
            closed: closed.clone(),
        });
        (handle, Outbox { rx, closed })
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue one message, waiting at most `timeout` for space.
    pub async fn deliver(&self, message: Arc<str>, timeout: Duration) -> Delivery {
        if self.is_closed() {
            return Delivery::Failed(DeliveryFailure::Closed);
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Delivery::Failed(DeliveryFailure::Closed),
            sent = tokio::time::timeout(timeout, self.tx.send(message)) => match sent {
                Ok(Ok(())) => Delivery::Delivered,
                Ok(Err(_)) => Delivery::Failed(DeliveryFailure::Closed),
                Err(_) => Delivery::Failed(DeliveryFailure::TimedOut {
                    ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }

    /// Signal the owning connection to shut down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl Outbox {
    /// Next queued message, or `None` once the handle is closed.
    ///
    /// Messages still queued at close time are discarded.
    pub async fn next(&mut self) -> Option<Arc<str>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Non-blocking form of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<Arc<str>> {
        if self.closed.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Resolves when the handle is closed by the feed or by shutdown.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}
