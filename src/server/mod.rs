//! TCP broadcast server.
//!
//! One task accepts connections and spawns a handler per client. Segments
//! enter through [`Broadcaster::publish`], which records them and queues
//! them for every live client.

pub mod broadcast;
pub mod connection;
pub mod onboard;
mod shutdown;

pub use broadcast::{Broadcaster, PublishOutcome};
pub use connection::ConnectionSettings;
pub use shutdown::{close_connections, shutdown_signal};

use crate::config::ServerConfig;
use crate::state::AppState;
use segcast_core::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Listening socket plus everything connection handlers need.
pub struct BroadcastServer {
    listener: TcpListener,
    state: Arc<AppState>,
    settings: ConnectionSettings,
    drain_timeout: Duration,
    tracker: TaskTracker,
}

impl BroadcastServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindFailure`] if the address is unavailable and
    /// [`Error::Config`] if `queue_capacity` is zero.
    pub async fn bind(config: &ServerConfig, state: Arc<AppState>) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::BindFailure {
                addr: addr.clone(),
                source,
            })?;

        tracing::info!("Broadcast server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            state,
            settings: ConnectionSettings::from(config),
            drain_timeout: config.drain_timeout(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Accept clients until `cancel` fires, then close every connection.
    ///
    /// Live clients are given up to the drain timeout to receive what was
    /// already published to them.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            listener,
            state,
            settings,
            drain_timeout,
            tracker,
        } = self;
        let connections = CancellationToken::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracker.spawn(connection::handle_connection(
                            state.clone(),
                            stream,
                            peer,
                            settings.clone(),
                            connections.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        drop(listener);
        tracing::info!("Listener closed");

        close_connections(&state, &tracker, drain_timeout, &connections).await;
        tracing::info!("Broadcast server shutdown complete");
    }
}
