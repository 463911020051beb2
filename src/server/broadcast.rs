//! Fan-out of newly finished segments to live connections.

use crate::state::{AppState, OutboundFrame};
use bytes::Bytes;
use segcast_core::{Error, Result, Segment};
use segcast_protocol::{encode_frame, SegmentFrame};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Result of publishing one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Appended to the store and queued for `delivered` live connections;
    /// `evicted` connections were dropped for lagging or being closed.
    Published { delivered: usize, evicted: usize },
    /// The store refused the index (duplicate or out of order).
    Rejected,
    /// The segment file could not be read; nothing was stored or sent.
    Unreadable,
}

/// Appends finished segments to the store and queues them for every live
/// connection.
///
/// The file is read and encoded once; all connections share the same
/// buffer. Queueing never blocks: a connection whose queue is full is
/// evicted instead of stalling the others.
#[derive(Clone)]
pub struct Broadcaster {
    state: Arc<AppState>,
}

impl Broadcaster {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn publish(&self, segment: Segment) -> PublishOutcome {
        let bytes = match encode_segment(&segment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    index = segment.index,
                    file = %segment.name,
                    error = %e,
                    "Failed to read finished segment, skipping"
                );
                return PublishOutcome::Unreadable;
            }
        };

        let index = segment.index;
        let name = segment.name.clone();

        let (delivered, lagging) = {
            let _gate = self.state.publish_gate();
            if !self.state.store.append(segment) {
                return PublishOutcome::Rejected;
            }

            let mut delivered = 0;
            let mut lagging = Vec::new();
            for conn in self.state.registry.snapshot_live() {
                let frame = OutboundFrame::Encoded {
                    index,
                    bytes: bytes.clone(),
                };
                match conn.outbound.try_send(frame) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => lagging.push((conn, "outbound queue full")),
                    Err(TrySendError::Closed(_)) => lagging.push((conn, "connection closed")),
                }
            }
            (delivered, lagging)
        };

        let evicted = lagging.len();
        for (conn, reason) in lagging {
            self.state.registry.remove(conn.id);
            tracing::warn!(conn = %conn.id, peer = %conn.peer, index, reason, "Evicted client");
        }

        tracing::info!(
            index,
            file = %name,
            bytes = bytes.len(),
            clients = delivered,
            "Published segment"
        );

        PublishOutcome::Published { delivered, evicted }
    }
}

/// Read a segment file and encode it as one wire frame.
pub(crate) async fn encode_segment(segment: &Segment) -> Result<Bytes> {
    let data = tokio::fs::read(&segment.path)
        .await
        .map_err(|e| Error::transient(segment.path.display().to_string(), e))?;

    if data.len() as u64 != segment.size_bytes {
        tracing::debug!(
            index = segment.index,
            expected = segment.size_bytes,
            actual = data.len(),
            "Segment size changed since it was finalized"
        );
    }

    let frame = SegmentFrame::new(segment.index, segment.name.clone(), data);
    encode_frame(&frame).map_err(|e| Error::internal(format!("encoding {}: {e}", segment.name)))
}
