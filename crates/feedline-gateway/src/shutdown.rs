use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Resolves on Ctrl-C, SIGTERM, or when `root` is cancelled from inside the
/// process, and cancels `root` on the way out.
pub async fn signal(root: CancellationToken) {
    tokio::select! {
        result = wait_for_os_signal() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to install signal handlers");
                root.cancelled().await;
            }
        }
        _ = root.cancelled() => {}
    }
    info!("shutting down");
    root.cancel();
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
