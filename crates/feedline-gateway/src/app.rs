use axum::{routing::get, Router};
use feedline_core::config::FeedlineConfig;
use feedline_feed::SubscriberRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: FeedlineConfig,
    /// Live subscribers; the event source broadcasts to the same instance.
    pub registry: Arc<SubscriberRegistry>,
    /// Process-wide shutdown. Every subscriber's close signal is a child.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: FeedlineConfig,
        registry: Arc<SubscriberRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use feedline_feed::SubscriberHandle;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            FeedlineConfig::default(),
            Arc::new(SubscriberRegistry::new()),
            CancellationToken::new(),
        ))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_subscriber_count() {
        let state = state();
        let (handle, _outbox) = SubscriberHandle::new(4, &state.shutdown);
        let _registration = state.registry.register(handle);

        let (status, body) = get_json(build_router(Arc::clone(&state)), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["subscribers"], 1);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_get() {
        let (status, _) = get_json(build_router(state()), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get_json(build_router(state()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
