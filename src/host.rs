//! Host side: produce segments and serve them to clients.
//!
//! Two kinds of source are accepted. A media file is handed to ffmpeg,
//! which writes segments into the encoder output directory; the watcher
//! follows that directory until ffmpeg exits. A directory is watched as-is
//! until the host is stopped.

use crate::config::Config;
use crate::encoder::{self, Encoder};
use crate::paths::reset_dir;
use crate::server::{BroadcastServer, Broadcaster};
use crate::state::AppState;
use crate::watch::{SegmentWatcher, WatchExit};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Where segments come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A media file to segment with ffmpeg.
    File(PathBuf),
    /// A directory some other writer fills with segment files.
    Directory(PathBuf),
}

impl Source {
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Ok(Self::Directory(path.to_path_buf()))
        } else if path.is_file() {
            Ok(Self::File(path.to_path_buf()))
        } else {
            anyhow::bail!("Source does not exist: {:?}", path);
        }
    }
}

/// Run the host until the source is exhausted (plus the linger period) or
/// `cancel` fires.
pub async fn run_host(config: Config, source: &Path, cancel: CancellationToken) -> Result<()> {
    let source = Source::detect(source)?;
    let pattern = config.watch.pattern();

    let state = AppState::new();
    let server = BroadcastServer::bind(&config.server, state.clone()).await?;
    let broadcaster = Broadcaster::new(state.clone());

    let (watch_dir, encoder) = match &source {
        Source::File(input) => {
            let ffmpeg = encoder::locate_ffmpeg(&config.encoder)?;
            let output_dir = &config.encoder.output_dir;
            reset_dir(output_dir).with_context(|| {
                format!("Failed to prepare encoder output directory: {:?}", output_dir)
            })?;
            let args = encoder::segment_args(input, output_dir, &pattern, &config.encoder);
            let encoder = Encoder::spawn(&ffmpeg, &args)?;
            (output_dir.clone(), Some(encoder))
        }
        Source::Directory(dir) => {
            tracing::info!("Serving segments from existing directory {:?}", dir);
            (dir.clone(), None)
        }
    };

    let server_task = tokio::spawn(server.run(cancel.clone()));
    let mut watcher = SegmentWatcher::new(watch_dir, pattern, config.watch.poll_interval());

    let (exit, encoder_result) = match encoder {
        Some(encoder) => {
            let (done_tx, done_rx) = oneshot::channel();
            let supervisor = tokio::spawn(supervise(encoder, cancel.clone(), done_tx));
            let finished = async {
                let _ = done_rx.await;
            };
            let exit = watcher.run(&broadcaster, &cancel, finished).await;
            let result = match supervisor.await {
                Ok(result) => result,
                Err(e) => Err(segcast_core::Error::internal(format!("encoder supervisor: {e}"))),
            };
            (exit, result)
        }
        None => {
            let exit = watcher
                .run(&broadcaster, &cancel, std::future::pending())
                .await;
            (exit, Ok(()))
        }
    };

    if exit == WatchExit::Completed {
        let linger = config.server.linger();
        tracing::info!(
            segments = state.store.len(),
            last_index = ?state.store.last_index(),
            clients = state.registry.len(),
            "Source exhausted, serving for {:?} before shutdown",
            linger
        );
        tokio::select! {
            _ = tokio::time::sleep(linger) => {}
            _ = cancel.cancelled() => {}
        }
    }

    cancel.cancel();
    if let Err(e) = server_task.await {
        tracing::error!("Server task failed: {}", e);
    }

    tracing::info!(segments = state.store.len(), "Host finished");
    encoder_result.context("Encoder failed")
}

/// Wait for the encoder, or stop it on cancellation. Signals `done` either
/// way.
async fn supervise(
    mut encoder: Encoder,
    cancel: CancellationToken,
    done: oneshot::Sender<()>,
) -> segcast_core::Result<()> {
    let outcome = tokio::select! {
        res = encoder.wait() => Some(res),
        _ = cancel.cancelled() => None,
    };

    let result = match outcome {
        Some(Ok(status)) => {
            tracing::info!("Encoder finished ({})", status);
            Ok(())
        }
        Some(Err(e)) => {
            tracing::error!("{}", e);
            Err(e)
        }
        None => {
            encoder.kill().await;
            tracing::info!("Encoder stopped");
            Ok(())
        }
    };

    let _ = done.send(());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(
            Source::detect(dir.path()).unwrap(),
            Source::Directory(dir.path().to_path_buf())
        );
        assert_eq!(Source::detect(&file).unwrap(), Source::File(file.clone()));
        assert!(Source::detect(&dir.path().join("missing.mp4")).is_err());
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_binding() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        let err = run_host(
            config,
            Path::new("/nonexistent/input.mp4"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_directory_source_serves_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chunk_000.mp4"), b"seg").unwrap();

        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.watch.poll_interval_ms = 10;

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            stopper.cancel();
        });

        run_host(config, dir.path(), cancel).await.unwrap();
    }
}
