//! Codec for encoding and decoding segment frames.

use crate::frame::{FrameHeader, SegmentFrame, FIXED_HEADER_LEN, MAX_NAME_LEN, PREAMBLE_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Not enough buffered data to decode a whole frame.
    #[error("Insufficient data")]
    InsufficientData,

    /// The stream ended partway through a frame.
    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes the current field required.
        expected: u64,
        /// Bytes actually read before EOF.
        got: u64,
    },

    /// The file name is longer than [`MAX_NAME_LEN`] or the `u32` length field.
    #[error("File name too long: {0} bytes")]
    NameTooLong(usize),

    /// The file name is not valid UTF-8.
    #[error("File name is not valid UTF-8")]
    InvalidName,

    /// The payload length does not fit in memory on this platform.
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a whole frame to bytes
///
/// # Errors
///
/// Returns an error if the name does not fit in the length field
pub fn encode_frame(frame: &SegmentFrame) -> Result<Bytes, CodecError> {
    let name = frame.name.as_bytes();
    if name.len() > MAX_NAME_LEN {
        return Err(CodecError::NameTooLong(name.len()));
    }

    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    put_header(&mut buf, frame.index, name, frame.payload.len() as u64);

    // Payload
    buf.extend_from_slice(&frame.payload);

    Ok(buf.freeze())
}

fn put_header(buf: &mut BytesMut, index: u32, name: &[u8], payload_len: u64) {
    // Segment index (4 bytes)
    buf.put_u32(index);

    // Name length (4 bytes) + name; bounded by MAX_NAME_LEN above
    buf.put_u32(name.len() as u32);
    buf.put_slice(name);

    // Payload length (8 bytes)
    buf.put_u64(payload_len);
}

/// Decode one frame from the front of a buffer.
///
/// On [`CodecError::InsufficientData`] nothing has been consumed, so the
/// caller can read more bytes into `data` and retry.
///
/// # Errors
///
/// Returns an error if the buffer holds less than a whole frame or the name
/// is invalid
pub fn decode_frame(data: &mut BytesMut) -> Result<SegmentFrame, CodecError> {
    let header = match peek_header(data)? {
        Some(header) => header,
        None => return Err(CodecError::InsufficientData),
    };

    let header_len = header.encoded_len();
    let payload_len = usize::try_from(header.payload_len)
        .map_err(|_| CodecError::PayloadTooLarge(header.payload_len))?;
    if data.len() < header_len + payload_len {
        return Err(CodecError::InsufficientData);
    }

    data.advance(header_len);
    let payload = data.split_to(payload_len).freeze();

    Ok(SegmentFrame {
        index: header.index,
        name: header.name,
        payload,
    })
}

/// Parse a header from the front of `data` without consuming anything.
///
/// Returns `Ok(None)` if the header is not fully buffered yet.
///
/// # Errors
///
/// Returns an error if the name is too long or not UTF-8
pub fn peek_header(data: &[u8]) -> Result<Option<FrameHeader>, CodecError> {
    if data.len() < PREAMBLE_LEN {
        return Ok(None);
    }

    let mut preamble = &data[..PREAMBLE_LEN];
    let index = preamble.get_u32();
    let name_len = preamble.get_u32() as usize;
    if name_len > MAX_NAME_LEN {
        return Err(CodecError::NameTooLong(name_len));
    }
    if data.len() < FIXED_HEADER_LEN + name_len {
        return Ok(None);
    }

    let name = std::str::from_utf8(&data[PREAMBLE_LEN..PREAMBLE_LEN + name_len])
        .map_err(|_| CodecError::InvalidName)?
        .to_string();
    let mut len_field = &data[PREAMBLE_LEN + name_len..FIXED_HEADER_LEN + name_len];
    let payload_len = len_field.get_u64();

    Ok(Some(FrameHeader {
        index,
        name,
        payload_len,
    }))
}
