//! Registry of connections that receive live frames.

use bytes::Bytes;
use parking_lot::Mutex;
use segcast_core::{ConnectionId, Segment};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An item waiting in a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// A fully encoded frame, shared between all live connections.
    Encoded { index: u32, bytes: Bytes },
    /// A segment the sender task encodes from disk before writing.
    FromDisk(Arc<Segment>),
}

impl OutboundFrame {
    pub fn index(&self) -> u32 {
        match self {
            Self::Encoded { index, .. } => *index,
            Self::FromDisk(segment) => segment.index,
        }
    }
}

/// Handle to a live connection, held by the registry.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub outbound: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
}

impl LiveConnection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        outbound: mpsc::Sender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            outbound,
            cancel,
        }
    }

    /// Ask the connection's tasks to stop and close the socket.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<ConnectionId, LiveConnection>,
    drained: bool,
}

/// Set of live connections.
///
/// Removing a connection closes it, and a closed connection is never
/// accepted, so a connection enters at most once. Once drained for shutdown
/// the registry accepts nothing further.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if it is already a member, has
    /// been closed, or the registry has been drained.
    pub fn add(&self, conn: LiveConnection) -> bool {
        let mut inner = self.inner.lock();
        if inner.drained || conn.is_closed() || inner.live.contains_key(&conn.id) {
            return false;
        }
        inner.live.insert(conn.id, conn);
        true
    }

    /// Remove and close a connection. Idempotent.
    pub fn remove(&self, id: ConnectionId) -> Option<LiveConnection> {
        let removed = self.inner.lock().live.remove(&id);
        if let Some(conn) = &removed {
            conn.close();
        }
        removed
    }

    /// Current members, ordered by id.
    pub fn snapshot_live(&self) -> Vec<LiveConnection> {
        let inner = self.inner.lock();
        let mut conns: Vec<LiveConnection> = inner.live.values().cloned().collect();
        conns.sort_by_key(|c| c.id);
        conns
    }

    /// Remove and return every member without closing it; later `add`
    /// calls are refused.
    pub fn drain(&self) -> Vec<LiveConnection> {
        let mut inner = self.inner.lock();
        inner.drained = true;
        inner.live.drain().map(|(_, c)| c).collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().live.is_empty()
    }
}
