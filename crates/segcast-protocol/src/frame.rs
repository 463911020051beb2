//! Frame types.

use bytes::Bytes;

/// Upper bound on the file name length a decoder will accept.
pub const MAX_NAME_LEN: usize = 4096;

/// Bytes of fixed-width fields in a header: index, name length, payload length.
pub const FIXED_HEADER_LEN: usize = 4 + 4 + 8;

/// Bytes before the file name: index and name length.
pub const PREAMBLE_LEN: usize = 4 + 4;

/// The metadata part of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Segment index.
    pub index: u32,
    /// File name the receiver stores the payload under.
    pub name: String,
    /// Number of payload bytes that follow the header.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Encoded length of this header (`16 + N`).
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.name.len()
    }
}

/// One segment on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFrame {
    /// Segment index.
    pub index: u32,
    /// File name of the segment.
    pub name: String,
    /// Segment bytes. May be empty.
    pub payload: Bytes,
}

impl SegmentFrame {
    /// Create a frame.
    pub fn new(index: u32, name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            index,
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Header describing this frame.
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            index: self.index,
            name: self.name.clone(),
            payload_len: self.payload.len() as u64,
        }
    }

    /// Total encoded length, header plus payload.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN + self.name.len() + self.payload.len()
    }
}
