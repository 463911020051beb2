//! Client side: connect to a host and save every segment it sends.

use crate::paths::{reset_dir, safe_file_name};
use anyhow::{Context, Result};
use segcast_protocol::{CodecError, FrameReader};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Largest segment the receiver will accept.
pub const MAX_SEGMENT_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// What a receive session produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveSummary {
    /// Segments written to disk.
    pub segments: usize,
    /// Payload bytes written to disk.
    pub bytes: u64,
    pub elapsed: Duration,
    /// `false` if the stream ended partway through a frame.
    pub complete: bool,
}

impl ReceiveSummary {
    /// Average payload throughput in KiB/s.
    pub fn rate_kib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / 1024.0 / secs
    }
}

/// Connect to `host:port`, empty `output_dir`, and receive until the host
/// closes the connection or `cancel` fires.
pub async fn run_receiver(
    host: &str,
    port: u16,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<ReceiveSummary> {
    reset_dir(output_dir)
        .with_context(|| format!("Failed to prepare output directory: {:?}", output_dir))?;

    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
    tracing::info!("Connected to {}:{}", host, port);

    let summary = receive(stream, output_dir, cancel).await?;

    tracing::info!(
        segments = summary.segments,
        bytes = summary.bytes,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        rate_kib_s = summary.rate_kib_per_sec(),
        "Receive finished"
    );

    Ok(summary)
}

/// Read frames from `reader` into `output_dir`.
///
/// Frames whose name is not a plain file name are read and dropped. A
/// frame announcing more than [`MAX_SEGMENT_BYTES`] ends the session with an
/// error.
pub async fn receive<R>(
    reader: R,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<ReceiveSummary>
where
    R: AsyncRead + Unpin,
{
    let started = Instant::now();
    let mut reader = FrameReader::new(reader).with_max_payload(MAX_SEGMENT_BYTES);
    let mut segments = 0;
    let mut bytes = 0u64;
    let mut complete = true;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Receive interrupted");
                break;
            }
            next = reader.read_frame() => next,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Host closed the connection");
                break;
            }
            Err(CodecError::Truncated { expected, got }) => {
                tracing::warn!(expected, got, "Connection closed in the middle of a segment");
                complete = false;
                break;
            }
            Err(e) => return Err(e).context("Failed to read segment frame"),
        };

        let Some(name) = safe_file_name(&frame.name) else {
            tracing::warn!(index = frame.index, name = %frame.name, "Ignoring segment with unsafe file name");
            continue;
        };

        let path = output_dir.join(name);
        tokio::fs::write(&path, &frame.payload)
            .await
            .with_context(|| format!("Failed to write segment: {:?}", path))?;

        segments += 1;
        bytes += frame.payload.len() as u64;
        tracing::info!(
            index = frame.index,
            file = %name,
            bytes = frame.payload.len(),
            "Received segment"
        );
    }

    Ok(ReceiveSummary {
        segments,
        bytes,
        elapsed: started.elapsed(),
        complete,
    })
}
