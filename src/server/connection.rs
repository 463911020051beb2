//! Per-connection tasks.
//!
//! Each accepted socket is split in two. The handler task owns the read
//! half: it onboards the client, then waits for the peer to hang up. A
//! separate sender task owns the write half and drains the connection's
//! outbound queue, so a slow client only ever stalls its own task.

use super::broadcast::encode_segment;
use super::onboard::onboard;
use crate::config::ServerConfig;
use crate::state::{AppState, OutboundFrame};
use segcast_core::{ConnectionId, ConnectionState, Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Per-connection tunables.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Longest a single frame write may take.
    pub send_timeout: Duration,
    /// Capacity of the outbound queue.
    pub queue_capacity: usize,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_timeout: config.send_timeout(),
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Serve one client until it disconnects, fails, or `cancel` fires.
pub async fn handle_connection(
    state: Arc<AppState>,
    stream: TcpStream,
    peer: SocketAddr,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) {
    let id = ConnectionId::next();
    let mut conn_state = ConnectionState::Onboarding;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(conn = %id, error = %e, "Failed to set TCP_NODELAY");
    }
    let (reader, mut writer) = stream.into_split();

    tracing::info!(conn = %id, %peer, "Client connected");

    let onboarded = match onboard(&state, id, peer, &mut writer, &settings, &cancel).await {
        Ok(onboarded) => onboarded,
        Err(e) => {
            transition(&mut conn_state, ConnectionState::Closed);
            tracing::warn!(conn = %id, %peer, error = %e, "Onboarding failed, closing connection");
            cancel.cancel();
            let _ = writer.shutdown().await;
            return;
        }
    };

    transition(&mut conn_state, ConnectionState::Live);
    tracing::info!(
        conn = %id,
        %peer,
        replayed = onboarded.replayed,
        queued = onboarded.queued,
        "Client is live"
    );

    let sender = tokio::spawn(run_sender(
        state.clone(),
        id,
        writer,
        onboarded.outbound,
        settings.send_timeout,
        cancel.clone(),
    ));

    let reason = watch_peer(reader, &cancel).await;

    state.registry.remove(id);
    cancel.cancel();
    if let Err(e) = sender.await {
        tracing::error!(conn = %id, error = %e, "Sender task panicked");
    }

    transition(&mut conn_state, ConnectionState::Closed);
    match reason {
        Some(e) => tracing::info!(conn = %id, %peer, reason = %e, "Client disconnected"),
        None => tracing::debug!(conn = %id, %peer, "Connection closed by server"),
    }
}

fn transition(current: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(
        current.can_transition_to(next),
        "illegal connection transition {current} -> {next}"
    );
    *current = next;
}

/// Write queued frames until the queue closes, a send fails, or `cancel`
/// fires. Removes the connection from the registry on the way out.
pub(crate) async fn run_sender<W>(
    state: Arc<AppState>,
    id: ConnectionId,
    mut writer: W,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    send_timeout: Duration,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let index = frame.index();
        let bytes = match frame {
            OutboundFrame::Encoded { bytes, .. } => bytes,
            OutboundFrame::FromDisk(segment) => match encode_segment(&segment).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(conn = %id, index, error = %e, "Skipping unreadable catch-up segment");
                    continue;
                }
            },
        };

        if let Err(e) = send_bytes(&mut writer, &bytes, send_timeout, &cancel).await {
            if !cancel.is_cancelled() {
                tracing::warn!(conn = %id, index, error = %e, "Send failed, evicting client");
            }
            break;
        }
        tracing::trace!(conn = %id, index, bytes = bytes.len(), "Sent segment");
    }

    state.registry.remove(id);
    cancel.cancel();
    let _ = writer.shutdown().await;
}

/// Write one encoded frame in full within `timeout`.
pub(crate) async fn send_bytes<W>(
    writer: &mut W,
    bytes: &[u8],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::PeerDisconnected("connection cancelled".into())),
        res = tokio::time::timeout(timeout, writer.write_all(bytes)) => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::from_send_io(e)),
            Err(_) => Err(Error::PeerTimeout(format!(
                "write of {} bytes stalled for {:?}",
                bytes.len(),
                timeout
            ))),
        },
    }
}

/// Wait for the peer to go away.
///
/// Clients never send anything meaningful; any bytes that arrive are
/// discarded. Returns `None` when stopped by `cancel`.
pub(crate) async fn watch_peer<R>(mut reader: R, cancel: &CancellationToken) -> Option<Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            res = reader.read(&mut buf) => match res {
                Ok(0) => return Some(Error::PeerDisconnected("end of stream".into())),
                Ok(n) => tracing::trace!(bytes = n, "Discarding bytes from client"),
                Err(e) => return Some(Error::from_send_io(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LiveConnection;
    use bytes::Bytes;
    use segcast_protocol::{encode_frame, FrameReader, SegmentFrame};

    #[tokio::test]
    async fn test_send_times_out_on_stalled_peer() {
        let (mut writer, _reader) = tokio::io::duplex(8);
        let err = send_bytes(
            &mut writer,
            &[0u8; 64],
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::PeerTimeout(_)));
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_fails() {
        let (mut writer, reader) = tokio::io::duplex(8);
        drop(reader);
        let err = send_bytes(
            &mut writer,
            &[0u8; 4],
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.is_peer_failure());
    }

    #[tokio::test]
    async fn test_watch_peer_sees_eof() {
        let (client, server) = tokio::io::duplex(8);
        drop(client);
        let reason = watch_peer(server, &CancellationToken::new()).await;
        assert!(matches!(reason, Some(Error::PeerDisconnected(_))));
    }

    #[tokio::test]
    async fn test_watch_peer_ignores_chatter() {
        let (mut client, server) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { watch_peer(server, &cancel).await }
        });

        client.write_all(b"hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        assert!(handle.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sender_writes_in_queue_order() {
        let state = AppState::new();
        let (tx, rx) = mpsc::channel(8);
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let id = ConnectionId::next();
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:3".parse().unwrap();
        state
            .registry
            .add(LiveConnection::new(id, addr, tx.clone(), cancel.clone()));

        for i in 0..3u32 {
            let frame = SegmentFrame::new(i, format!("chunk_{i:03}.mp4"), Bytes::from(vec![i as u8; 3]));
            tx.send(OutboundFrame::Encoded {
                index: i,
                bytes: encode_frame(&frame).unwrap(),
            })
            .await
            .unwrap();
        }
        drop(tx);

        run_sender(
            state.clone(),
            id,
            server_side,
            rx,
            Duration::from_secs(1),
            cancel.clone(),
        )
        .await;

        // Queue closed: sender removed itself and closed the stream
        assert!(!state.registry.contains(id));
        assert!(cancel.is_cancelled());

        let mut reader = FrameReader::new(client_side);
        for i in 0..3 {
            assert_eq!(reader.read_frame().await.unwrap().unwrap().index, i);
        }
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
