//! Segcast-Protocol: the one-way segment framing used between host and
//! receivers.
//!
//! Every finalized segment travels as one self-contained frame, sent back to
//! back with no delimiter. All integers are big-endian:
//!
//! ```text
//! u32  segment_index
//! u32  filename_length (N)
//! [N]  filename (UTF-8)
//! u64  payload_length (L)
//! [L]  payload
//! ```
//!
//! # Modules
//!
//! - `frame` - The [`SegmentFrame`] type and header arithmetic
//! - `codec` - Buffer-level encode/decode
//! - `stream` - Async frame writer and bounded-read frame reader
//!
//! A reader must consume exactly `16 + N` header bytes and then exactly `L`
//! payload bytes; a short read mid-frame is fatal for the stream because
//! the framing cannot be recovered.

pub mod codec;
pub mod frame;
pub mod stream;

pub use codec::{decode_frame, encode_frame, peek_header, CodecError};
pub use frame::{FrameHeader, SegmentFrame};
pub use stream::{write_frame, FrameReader};
