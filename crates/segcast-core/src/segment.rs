//! Segment descriptors and the segment file naming scheme.
//!
//! The encoder writes files named `<prefix><zero-padded index>.<extension>`
//! into a flat directory. [`SegmentPattern`] recognises those names and
//! extracts the index; [`Segment`] describes a file that has been judged
//! complete.

use std::path::{Path, PathBuf};

/// Zero-padding width used when the encoder numbers segments.
pub const INDEX_WIDTH: usize = 3;

/// A finalized segment file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Index parsed from the file name.
    pub index: u32,
    /// File name (no directory component), sent on the wire.
    pub name: String,
    /// Size observed when the file was judged stable.
    pub size_bytes: u64,
    /// Location on disk.
    pub path: PathBuf,
}

impl Segment {
    /// Build a descriptor for `name` inside `dir`.
    pub fn new(index: u32, name: impl Into<String>, size_bytes: u64, dir: &Path) -> Self {
        let name = name.into();
        let path = dir.join(&name);
        Self {
            index,
            name,
            size_bytes,
            path,
        }
    }
}

/// Outcome of matching a file name against a [`SegmentPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// A segment file with the given index.
    Segment(u32),
    /// Has the prefix and extension but the index is not a number.
    Malformed,
    /// Not a segment file at all (playlists, temp files, ...).
    Unrelated,
}

/// The `<prefix><index>.<extension>` naming scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPattern {
    prefix: String,
    extension: String,
}

impl SegmentPattern {
    /// Create a pattern. A leading dot on `extension` is optional.
    pub fn new(prefix: impl Into<String>, extension: impl AsRef<str>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.as_ref().trim_start_matches('.').to_string(),
        }
    }

    /// File name prefix, e.g. `chunk_`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extension without the dot, e.g. `mp4`.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Classify a file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use segcast_core::{NameMatch, SegmentPattern};
    ///
    /// let pattern = SegmentPattern::new("chunk_", ".mp4");
    /// assert_eq!(pattern.classify("chunk_000.mp4"), NameMatch::Segment(0));
    /// assert_eq!(pattern.classify("chunk_1000.mp4"), NameMatch::Segment(1000));
    /// assert_eq!(pattern.classify("chunk_abc.mp4"), NameMatch::Malformed);
    /// assert_eq!(pattern.classify("chunk_001.mkv"), NameMatch::Unrelated);
    /// ```
    pub fn classify(&self, name: &str) -> NameMatch {
        let Some(rest) = name.strip_prefix(self.prefix.as_str()) else {
            return NameMatch::Unrelated;
        };
        let Some(stem) = rest
            .strip_suffix(self.extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            return NameMatch::Unrelated;
        };

        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return NameMatch::Malformed;
        }

        match stem.parse::<u32>() {
            Ok(index) => NameMatch::Segment(index),
            Err(_) => NameMatch::Malformed,
        }
    }

    /// Parse the index from a file name, if it is a well-formed segment name.
    pub fn parse_index(&self, name: &str) -> Option<u32> {
        match self.classify(name) {
            NameMatch::Segment(index) => Some(index),
            _ => None,
        }
    }

    /// File name the encoder produces for `index`.
    pub fn file_name(&self, index: u32) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            index,
            self.extension,
            width = INDEX_WIDTH
        )
    }

    /// Output template in the printf style ffmpeg's segment muxer expects.
    pub fn encoder_template(&self) -> String {
        format!("{}%0{}d.{}", self.prefix, INDEX_WIDTH, self.extension)
    }
}

impl Default for SegmentPattern {
    fn default() -> Self {
        Self::new("chunk_", "mp4")
    }
}
