//! Bringing a new connection up to date before it goes live.
//!
//! The backlog is replayed straight onto the socket without holding any
//! lock. Whatever was published meanwhile is replayed again in further
//! rounds until the remainder is small, then the remainder is queued and
//! the connection registered in one step under the publish gate. A client
//! still too far behind after [`MAX_REPLAY_ROUNDS`] rounds is dropped.

use super::broadcast::encode_segment;
use super::connection::{send_bytes, ConnectionSettings};
use crate::state::{AppState, LiveConnection, OutboundFrame};
use segcast_core::{ConnectionId, Error, Result};
use std::net::SocketAddr;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replay rounds a joining client gets before it must fit in its queue.
pub const MAX_REPLAY_ROUNDS: usize = 8;

/// A connection that has been replayed and registered.
#[derive(Debug)]
pub struct Onboarded {
    /// Receiving end of the connection's outbound queue.
    pub outbound: mpsc::Receiver<OutboundFrame>,
    /// Frames written directly during replay.
    pub replayed: usize,
    /// Frames queued as catch-up at registration.
    pub queued: usize,
}

pub async fn onboard<W>(
    state: &AppState,
    id: ConnectionId,
    peer: SocketAddr,
    writer: &mut W,
    settings: &ConnectionSettings,
    cancel: &CancellationToken,
) -> Result<Onboarded>
where
    W: AsyncWrite + Unpin,
{
    let catch_up_limit = (settings.queue_capacity / 2).max(1);
    let mut last: Option<u32> = None;
    let mut replayed = 0;
    let mut rounds = 0;

    let mut backlog = state.store.after(None);
    tracing::debug!(conn = %id, segments = backlog.len(), "Replaying backlog");

    while rounds < MAX_REPLAY_ROUNDS
        && (backlog.len() > catch_up_limit || (last.is_none() && !backlog.is_empty()))
    {
        rounds += 1;
        for segment in &backlog {
            match encode_segment(segment).await {
                Ok(bytes) => {
                    send_bytes(writer, &bytes, settings.send_timeout, cancel).await?;
                    replayed += 1;
                }
                Err(e) => {
                    tracing::warn!(conn = %id, index = segment.index, error = %e, "Skipping unreadable segment in replay");
                }
            }
            last = Some(segment.index);
        }
        backlog = state.store.after(last);
    }

    let (tx, rx) = mpsc::channel(settings.queue_capacity);
    let conn = LiveConnection::new(id, peer, tx.clone(), cancel.clone());

    let queued = {
        let _gate = state.publish_gate();
        let catch_up = state.store.after(last);
        let queued = catch_up.len();
        if queued > settings.queue_capacity {
            return Err(Error::PeerTimeout(format!(
                "{queued} segments behind after {rounds} replay rounds exceed the outbound queue"
            )));
        }
        for segment in catch_up {
            if tx.try_send(OutboundFrame::FromDisk(segment)).is_err() {
                return Err(Error::internal("outbound queue closed during registration"));
            }
        }
        if !state.registry.add(conn) {
            return Err(Error::PeerDisconnected("server is shutting down".into()));
        }
        queued
    };

    Ok(Onboarded {
        outbound: rx,
        replayed,
        queued,
    })
}
