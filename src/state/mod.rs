//! State shared by the broadcaster and connection handlers.

mod registry;
mod store;

pub use registry::{ConnectionRegistry, LiveConnection, OutboundFrame};
pub use store::SegmentStore;

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Segment history plus the set of live connections.
///
/// Publishing a segment and promoting a connection to live both happen
/// under the publish gate, so a promoted connection either sees a segment
/// in its catch-up or receives it as a live frame, never both and never
/// neither. Lock order is gate, then store, then registry. None of these
/// locks is held across an await point.
#[derive(Debug, Default)]
pub struct AppState {
    pub store: SegmentStore,
    pub registry: ConnectionRegistry,
    publish_gate: Mutex<()>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serialize against publishes and promotions.
    pub fn publish_gate(&self) -> MutexGuard<'_, ()> {
        self.publish_gate.lock()
    }
}
