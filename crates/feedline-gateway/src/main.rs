use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use feedline_core::config::FeedlineConfig;
use feedline_feed::{Broadcaster, EventSource, SubscriberRegistry};
use feedline_store::SqliteEventLog;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod http;
mod retention;
mod shutdown;
mod ws;

/// Streams change-log events to WebSocket subscribers.
#[derive(Debug, Parser)]
#[command(name = "feedline-gateway", version, about)]
struct Args {
    /// Path to feedline.toml (falls back to FEEDLINE_CONFIG, then
    /// ~/.feedline/feedline.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override gateway.bind.
    #[arg(long)]
    bind: Option<String>,

    /// Override gateway.port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "feedline_gateway=info,feedline_feed=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();

    // explicit flag > FEEDLINE_CONFIG env > ~/.feedline/feedline.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("FEEDLINE_CONFIG").ok());
    let mut config = FeedlineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        FeedlineConfig::default()
    });
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening event log");
    let log = SqliteEventLog::open(db_path)?;
    if let Some(latest) = log.latest_id()? {
        info!(latest_id = latest, "event log has history");
    }

    // root of every cancellation in the process: poll loop, sweeper and
    // each subscriber's close signal
    let root = CancellationToken::new();

    let registry = Arc::new(SubscriberRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry), config.feed.send_timeout());
    let source = EventSource::new(Arc::new(log.clone()), broadcaster, &config.feed);
    let poller = tokio::spawn(source.run(root.clone()));

    let sweeper = if config.retention.enabled {
        Some(tokio::spawn(retention::run(
            log.clone(),
            config.retention.clone(),
            root.clone(),
        )))
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, Arc::clone(&registry), root.clone()));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        commit = env!("FEEDLINE_GIT_SHA"),
        "Feedline gateway listening on {}", addr
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::signal(root.clone()))
        .await?;

    // serve also returns on accept errors; make sure everything stops
    root.cancel();
    registry.close_all();
    let cursor = poller.await?;
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }
    info!(
        cursor = cursor.last_delivered_id(),
        "Feedline gateway stopped"
    );
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
