use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use feedline_core::config::MAX_INBOUND_BYTES;
use feedline_core::SubscriberId;
use feedline_feed::{Outbox, SubscriberHandle};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::AppState;

/// Why a subscriber connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Close frame or end of stream from the client.
    ClientClosed,
    ReceiveError,
    Oversize,
    /// Writing to the socket failed.
    SendFailed,
    /// The feed dropped the subscriber or the process is shutting down.
    Closed,
    WriterPanicked,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Exit::ClientClosed => "client closed",
            Exit::ReceiveError => "receive error",
            Exit::Oversize => "inbound frame too large",
            Exit::SendFailed => "send failed",
            Exit::Closed => "closed by feed",
            Exit::WriterPanicked => "writer panicked",
        })
    }
}

/// Axum handler: upgrades HTTP to WebSocket at GET /ws.
///
/// No handshake payload is expected. A request that is not a valid upgrade
/// is rejected by the extractor before any subscriber exists.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_INBOUND_BYTES)
        .on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection lifecycle: register, stream the outbox to the socket, and
/// watch the inbound side for liveness until either half ends.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    if state.shutdown.is_cancelled() {
        return;
    }

    let (handle, outbox) =
        SubscriberHandle::new(state.config.feed.subscriber_buffer, &state.shutdown);
    // deregisters and closes on every exit path, unwinding included
    let registration = state.registry.register(handle);
    let id = registration.id();
    info!(
        subscriber = %id,
        subscribers = state.registry.current_subscriber_count(),
        "subscriber connected"
    );

    let (tx, mut rx) = socket.split();
    let sink = Arc::new(Mutex::new(tx));
    let mut writer = tokio::spawn(write_loop(outbox, Arc::clone(&sink)));

    let exit = tokio::select! {
        exit = read_loop(&mut rx, &*sink, id) => exit,
        joined = &mut writer => joined.unwrap_or(Exit::WriterPanicked),
    };

    drop(registration);
    if !writer.is_finished() {
        // the handle is closed now, so the writer is on its way out
        let _ = writer.await;
    }

    // best effort; a client that stopped reading must not hold the task
    let send_timeout = state.config.feed.send_timeout();
    let _ = tokio::time::timeout(send_timeout, async {
        sink.lock().await.send(Message::Close(None)).await
    })
    .await;

    info!(
        subscriber = %id,
        reason = %exit,
        subscribers = state.registry.current_subscriber_count(),
        "subscriber disconnected"
    );
}

/// Drain the subscriber's queue into the socket until the handle closes or
/// a write fails.
async fn write_loop<S>(mut outbox: Outbox, sink: Arc<Mutex<S>>) -> Exit
where
    S: Sink<Message> + Unpin + Send,
{
    while let Some(text) = outbox.next().await {
        let mut guard = sink.lock().await;
        tokio::select! {
            biased;
            _ = outbox.closed() => return Exit::Closed,
            sent = guard.send(Message::Text(text.to_string().into())) => {
                if sent.is_err() {
                    return Exit::SendFailed;
                }
            }
        }
    }
    Exit::Closed
}

/// Subscribers have nothing to say: inbound data is discarded and only
/// pings, closes and errors matter.
async fn read_loop<St, E, S>(rx: &mut St, sink: &Mutex<S>, id: SubscriberId) -> Exit
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
    S: Sink<Message> + Unpin,
{
    loop {
        match rx.next().await {
            Some(Ok(Message::Text(text))) if text.len() > MAX_INBOUND_BYTES => {
                warn!(subscriber = %id, size = text.len(), "payload too large");
                return Exit::Oversize;
            }
            Some(Ok(Message::Binary(data))) if data.len() > MAX_INBOUND_BYTES => {
                warn!(subscriber = %id, size = data.len(), "payload too large");
                return Exit::Oversize;
            }
            Some(Ok(Message::Ping(data))) => {
                let mut guard = sink.lock().await;
                if guard.send(Message::Pong(data)).await.is_err() {
                    return Exit::SendFailed;
                }
            }
            Some(Ok(Message::Close(_))) | None => return Exit::ClientClosed,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(subscriber = %id, error = %e, "websocket receive failed");
                return Exit::ReceiveError;
            }
        }
    }
}
