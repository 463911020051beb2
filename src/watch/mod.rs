pub mod settle;

pub use settle::SettleTracker;

use crate::server::{Broadcaster, PublishOutcome};
use segcast_core::{Segment, SegmentPattern};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Pause between the writer exiting and the final scan.
const FINAL_SCAN_DELAY: Duration = Duration::from_millis(500);

/// Why [`SegmentWatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The writer finished and the final scan has been published.
    Completed,
    /// Stopped by cancellation before the writer finished.
    Cancelled,
}

/// Polls a segment directory and publishes finished segments.
pub struct SegmentWatcher {
    dir: PathBuf,
    tracker: SettleTracker,
    poll_interval: Duration,
    published: usize,
}

impl SegmentWatcher {
    pub fn new(dir: impl Into<PathBuf>, pattern: SegmentPattern, poll_interval: Duration) -> Self {
        let dir = dir.into();
        Self {
            tracker: SettleTracker::new(dir.clone(), pattern),
            dir,
            poll_interval,
            published: 0,
        }
    }

    /// Scan the directory once and return newly finished segments.
    ///
    /// Listing and stats run on the blocking pool. A directory that cannot
    /// be listed yields nothing; the next scan tries again.
    pub async fn scan(&mut self, final_flush: bool) -> Vec<Segment> {
        let dir = self.dir.clone();
        let sizes = match tokio::task::spawn_blocking(move || list_sizes(&dir)).await {
            Ok(Ok(sizes)) => sizes,
            Ok(Err(e)) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to list segment directory");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(error = %e, "Directory scan task failed");
                return Vec::new();
            }
        };

        let names: Vec<String> = sizes.keys().cloned().collect();
        self.tracker.observe(
            names,
            |name| match sizes.get(name) {
                Some(Ok(size)) => Ok(*size),
                Some(Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
                None => Err(io::ErrorKind::NotFound.into()),
            },
            final_flush,
        )
    }

    /// Number of segments handed to the broadcaster so far.
    pub fn published(&self) -> usize {
        self.published
    }

    /// Poll until `finished` resolves, then do a final scan and return.
    ///
    /// `finished` signals that the writer has exited and no file will grow
    /// any further.
    pub async fn run<F>(
        &mut self,
        broadcaster: &Broadcaster,
        cancel: &CancellationToken,
        finished: F,
    ) -> WatchExit
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            dir = %self.dir.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Watching for segments"
        );

        tokio::pin!(finished);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Segment watcher cancelled");
                    return WatchExit::Cancelled;
                }
                _ = &mut finished => break,
                _ = ticker.tick() => {
                    for segment in self.scan(false).await {
                        self.publish(broadcaster, segment).await;
                    }
                }
            }
        }

        tracing::info!("Writer finished, running final scan");
        tokio::select! {
            _ = cancel.cancelled() => return WatchExit::Cancelled,
            _ = tokio::time::sleep(FINAL_SCAN_DELAY) => {}
        }
        for segment in self.scan(true).await {
            self.publish(broadcaster, segment).await;
        }

        tracing::info!(segments = self.published, "All segments published");
        WatchExit::Completed
    }

    async fn publish(&mut self, broadcaster: &Broadcaster, segment: Segment) {
        tracing::debug!(index = segment.index, size = segment.size_bytes, "Segment finished");
        if let PublishOutcome::Published { .. } = broadcaster.publish(segment).await {
            self.published += 1;
        }
    }
}

/// Regular files in `dir` with their current sizes.
fn list_sizes(dir: &Path) -> io::Result<HashMap<String, io::Result<u64>>> {
    let mut sizes = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            let size = std::fs::metadata(entry.path()).map(|m| m.len());
            sizes.insert(name.to_string(), size);
        }
    }
    Ok(sizes)
}
