use crate::state::AppState;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Close every live connection and wait for connection tasks to finish.
///
/// The listener must already be closed. Draining the registry drops the
/// last handle to each outbound queue, so every sender writes out what is
/// already queued, closes its socket and exits. Anything still running after
/// `drain_timeout` is stopped through `connections`, the parent of every
/// connection's token.
pub async fn close_connections(
    state: &AppState,
    tracker: &TaskTracker,
    drain_timeout: Duration,
    connections: &CancellationToken,
) {
    let drained = state.registry.drain();
    tracing::info!(clients = drained.len(), "Flushing client connections");
    drop(drained);

    tracker.close();
    if tokio::time::timeout(drain_timeout, tracker.wait()).await.is_err() {
        tracing::warn!(
            remaining = tracker.len(),
            "Connection tasks did not finish within {:?}, closing them",
            drain_timeout
        );
        connections.cancel();
        tracker.wait().await;
    }
}
