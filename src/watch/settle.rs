use segcast_core::{Error, NameMatch, Segment, SegmentPattern};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::PathBuf;

/// Decides when segment files in a directory are finished.
///
/// A file is finished once two consecutive observations report the same
/// non-zero size. The tracker is fed one directory listing per poll and
/// returns the segments that became ready, in ascending index order.
///
/// A ready segment is held back while a lower-indexed file has data and is
/// still being written. Empty lower files do not hold anything back. A
/// segment that finishes after a higher index was already released is
/// dropped, so callers never see indices out of order. The final flush
/// releases everything that is on disk and non-empty.
pub struct SettleTracker {
    dir: PathBuf,
    pattern: SegmentPattern,
    /// Names present in the previous listing
    last_listing: HashSet<String>,
    /// Candidate files and the size seen at their last observation
    watched: HashMap<String, u64>,
    /// Finished segments waiting on a lower index
    ready: BTreeMap<u32, Segment>,
    emitted: BTreeSet<u32>,
    /// Highest index released so far
    high_water: Option<u32>,
    /// Malformed names, reported once and ignored afterwards
    rejected: HashSet<String>,
}

impl SettleTracker {
    pub fn new(dir: impl Into<PathBuf>, pattern: SegmentPattern) -> Self {
        Self {
            dir: dir.into(),
            pattern,
            last_listing: HashSet::new(),
            watched: HashMap::new(),
            ready: BTreeMap::new(),
            emitted: BTreeSet::new(),
            high_water: None,
            rejected: HashSet::new(),
        }
    }

    /// Number of files still being observed.
    pub fn pending(&self) -> usize {
        self.watched.len() + self.ready.len()
    }

    /// Process one directory listing.
    ///
    /// `size_of` returns the current size of a file by name. A `NotFound`
    /// error means the file vanished; any other error is treated as
    /// transient and the file is looked at again on the next call.
    pub fn observe<I, F>(&mut self, listing: I, mut size_of: F, final_flush: bool) -> Vec<Segment>
    where
        I: IntoIterator<Item = String>,
        F: FnMut(&str) -> io::Result<u64>,
    {
        let current: HashSet<String> = listing.into_iter().collect();
        let mut finished: Vec<(String, u64)> = Vec::new();
        let mut retry: HashSet<String> = HashSet::new();

        // Files seen before: compare against the last recorded size
        let known: Vec<String> = self.watched.keys().cloned().collect();
        for name in known {
            if !current.contains(&name) {
                tracing::debug!(file = %name, "Segment candidate disappeared");
                self.watched.remove(&name);
                continue;
            }

            let last = self.watched.get(&name).copied().unwrap_or_default();
            match size_of(&name) {
                Ok(size) if size == last && size > 0 => {
                    self.watched.remove(&name);
                    finished.push((name, size));
                }
                Ok(size) if size != last => {
                    tracing::trace!(file = %name, size, "Segment still growing");
                    self.watched.insert(name, size);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(file = %name, "Segment candidate disappeared");
                    self.watched.remove(&name);
                }
                Err(e) => {
                    let err = Error::transient(name.as_str(), e);
                    tracing::warn!(error = %err, "Failed to stat segment, will retry");
                }
            }
        }

        // Files new since the previous listing get their first observation
        let mut fresh: Vec<String> = current.difference(&self.last_listing).cloned().collect();
        fresh.sort();
        for name in &fresh {
            if self.rejected.contains(name) || self.watched.contains_key(name) {
                continue;
            }
            let index = match self.pattern.classify(name) {
                NameMatch::Segment(index) => index,
                NameMatch::Unrelated => continue,
                NameMatch::Malformed => {
                    let err = Error::ProtocolParse(name.clone());
                    tracing::warn!(error = %err, "Ignoring file for good");
                    self.rejected.insert(name.clone());
                    continue;
                }
            };
            if self.emitted.contains(&index) || self.ready.contains_key(&index) {
                continue;
            }

            match size_of(name) {
                Ok(size) => {
                    tracing::trace!(file = %name, size, "New segment candidate");
                    self.watched.insert(name.clone(), size);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(file = %name, "New segment vanished before stat");
                    retry.insert(name.clone());
                }
                Err(e) => {
                    let err = Error::transient(name.as_str(), e);
                    tracing::warn!(error = %err, "Failed to stat new segment, will retry");
                    retry.insert(name.clone());
                }
            }
        }

        if final_flush {
            // The writer has exited: whatever is on disk now is complete
            self.watched.clear();
            let done: HashSet<String> = finished.iter().map(|(name, _)| name.clone()).collect();
            let mut listed: Vec<&String> = current.iter().collect();
            listed.sort();
            for name in listed {
                if done.contains(name) || self.rejected.contains(name) {
                    continue;
                }
                let NameMatch::Segment(index) = self.pattern.classify(name) else {
                    continue;
                };
                if self.emitted.contains(&index) || self.ready.contains_key(&index) {
                    continue;
                }
                match size_of(name.as_str()) {
                    Ok(size) if size > 0 => finished.push((name.clone(), size)),
                    Ok(_) => tracing::debug!(file = %name, "Skipping empty segment at final flush"),
                    Err(e) => tracing::warn!(file = %name, error = %e, "Failed to stat segment at final flush"),
                }
            }
        }

        for (name, size) in finished {
            let Some(index) = self.pattern.parse_index(&name) else {
                continue;
            };
            if self.emitted.contains(&index) {
                continue;
            }
            self.ready
                .entry(index)
                .or_insert_with(|| Segment::new(index, name, size, &self.dir));
        }

        self.last_listing = current.difference(&retry).cloned().collect();

        self.release(final_flush)
    }

    /// Pop ready segments that no growing lower index can precede.
    fn release(&mut self, all: bool) -> Vec<Segment> {
        if let Some(high) = self.high_water {
            let late: Vec<u32> = self.ready.range(..high).map(|(index, _)| *index).collect();
            for index in late {
                self.ready.remove(&index);
                self.emitted.insert(index);
                tracing::warn!(index, released = high, "Segment finished after a higher index, dropping");
            }
        }

        let floor = if all {
            None
        } else {
            self.watched
                .iter()
                .filter(|(_, size)| **size > 0)
                .filter_map(|(name, _)| self.pattern.parse_index(name))
                .filter(|index| self.high_water.map_or(true, |high| *index > high))
                .min()
        };

        let releasable: Vec<u32> = self
            .ready
            .keys()
            .copied()
            .take_while(|index| floor.map_or(true, |floor| *index < floor))
            .collect();

        let mut out = Vec::with_capacity(releasable.len());
        for index in releasable {
            if let Some(segment) = self.ready.remove(&index) {
                self.emitted.insert(index);
                self.high_water = Some(index);
                out.push(segment);
            }
        }

        if !self.ready.is_empty() {
            tracing::debug!(
                held = self.ready.len(),
                waiting_on = ?floor,
                "Holding finished segments behind an unfinished lower index"
            );
        }

        out
    }
}
