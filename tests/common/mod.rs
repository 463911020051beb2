//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which binds a [`BroadcastServer`] on a random
//! loopback port and hands back the shared state, a [`Broadcaster`] and a
//! temporary directory for segment files.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use segcast::config::ServerConfig;
use segcast::server::{BroadcastServer, Broadcaster, PublishOutcome};
use segcast::state::AppState;
use segcast_core::Segment;
use segcast_protocol::{FrameReader, SegmentFrame};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long tests wait for anything asynchronous to happen.
pub const WAIT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub broadcaster: Broadcaster,
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    pub server: Option<JoinHandle<()>>,
    pub dir: TempDir,
}

impl TestHarness {
    /// Start a server with default settings.
    pub async fn start() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    /// Start a server with `config`; host and port are overridden.
    pub async fn with_config(mut config: ServerConfig) -> Self {
        config.host = "127.0.0.1".to_string();
        config.port = 0;

        let state = AppState::new();
        let server = BroadcastServer::bind(&config, state.clone())
            .await
            .expect("failed to bind test server");
        let addr = server.local_addr().expect("local addr");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));

        Self {
            broadcaster: Broadcaster::new(state.clone()),
            state,
            addr,
            cancel,
            server: Some(handle),
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Write a segment file and return its descriptor.
    pub fn segment(&self, index: u32, payload: &[u8]) -> Segment {
        let name = format!("chunk_{index:03}.mp4");
        std::fs::write(self.dir.path().join(&name), payload).expect("write segment");
        Segment::new(index, name, payload.len() as u64, self.dir.path())
    }

    /// Write and publish a segment whose payload identifies its index.
    pub async fn publish(&self, index: u32) -> PublishOutcome {
        let segment = self.segment(index, &payload_for(index));
        self.broadcaster.publish(segment).await
    }

    pub async fn connect(&self) -> FrameReader<TcpStream> {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        FrameReader::new(stream)
    }

    /// Wait until exactly `n` connections are live.
    pub async fn wait_for_live(&self, n: usize) {
        wait_until(|| self.state.registry.len() == n).await;
    }

    /// Stop the server and wait for it to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.server.take() {
            tokio::time::timeout(WAIT, handle)
                .await
                .expect("server shutdown timed out")
                .expect("server task panicked");
        }
    }
}

/// Deterministic payload for a segment index.
pub fn payload_for(index: u32) -> Vec<u8> {
    let len = 100 + (index as usize * 37) % 400;
    (0..len).map(|i| (i as u32 ^ index) as u8).collect()
}

/// Read one frame, failing the test on timeout, error or EOF.
pub async fn next_frame(reader: &mut FrameReader<TcpStream>) -> SegmentFrame {
    tokio::time::timeout(WAIT, reader.read_frame())
        .await
        .expect("timed out waiting for frame")
        .expect("read error")
        .expect("unexpected end of stream")
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {WAIT:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
