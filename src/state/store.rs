//! Append-only history of published segments.
//!
//! Late joiners replay the store from the start, so it holds every
//! segment published during the run.

use parking_lot::RwLock;
use segcast_core::Segment;
use std::sync::Arc;

/// Ordered, append-only list of published segments.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment.
    ///
    /// Returns `false` and leaves the store untouched if the index is not
    /// greater than the last stored index.
    pub fn append(&self, segment: Segment) -> bool {
        let mut segments = self.segments.write();
        if let Some(last) = segments.last() {
            if segment.index <= last.index {
                tracing::warn!(
                    index = segment.index,
                    last = last.index,
                    file = %segment.name,
                    "Rejecting segment that does not advance the index"
                );
                return false;
            }
        }
        segments.push(Arc::new(segment));
        true
    }

    /// Copy of the current contents, unaffected by later appends.
    pub fn snapshot(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    /// Segments with an index greater than `after`; all of them for `None`.
    pub fn after(&self, after: Option<u32>) -> Vec<Arc<Segment>> {
        let segments = self.segments.read();
        match after {
            None => segments.clone(),
            Some(index) => {
                let start = segments.partition_point(|s| s.index <= index);
                segments[start..].to_vec()
            }
        }
    }

    pub fn last_index(&self) -> Option<u32> {
        self.segments.read().last().map(|s| s.index)
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn seg(index: u32) -> Segment {
        Segment::new(index, format!("chunk_{index:03}.mp4"), 10, Path::new("/tmp"))
    }

    #[test]
    fn test_append_in_order() {
        let store = SegmentStore::new();
        assert!(store.is_empty());
        assert!(store.append(seg(0)));
        assert!(store.append(seg(1)));
        assert!(store.append(seg(5)));
        assert_eq!(store.len(), 3);
        assert_eq!(store.last_index(), Some(5));
    }

    #[test]
    fn test_rejects_duplicate_and_regression() {
        let store = SegmentStore::new();
        assert!(store.append(seg(3)));
        assert!(!store.append(seg(3)));
        assert!(!store.append(seg(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let store = SegmentStore::new();
        store.append(seg(0));
        let snap = store.snapshot();
        store.append(seg(1));
        assert_eq!(snap.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_after() {
        let store = SegmentStore::new();
        for i in [0, 1, 2, 4] {
            store.append(seg(i));
        }
        let idx = |v: Vec<Arc<Segment>>| v.iter().map(|s| s.index).collect::<Vec<_>>();
        assert_eq!(idx(store.after(None)), vec![0, 1, 2, 4]);
        assert_eq!(idx(store.after(Some(1))), vec![2, 4]);
        assert_eq!(idx(store.after(Some(3))), vec![4]);
        assert!(store.after(Some(4)).is_empty());
    }
}
