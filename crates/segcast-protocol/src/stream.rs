//! Async frame I/O over byte streams.

use crate::codec::{encode_frame, CodecError};
use crate::frame::{SegmentFrame, MAX_NAME_LEN, PREAMBLE_LEN};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest single read issued while accumulating a payload.
pub const READ_CHUNK: usize = 64 * 1024;

/// Cap on the up-front allocation for a payload; larger payloads grow the
/// buffer as bytes actually arrive.
const INITIAL_PAYLOAD_CAPACITY: usize = 1024 * 1024;

/// Encode `frame` and write it in full.
///
/// # Errors
///
/// Returns an error if the name cannot be encoded or the write fails
pub async fn write_frame<W>(writer: &mut W, frame: &SegmentFrame) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Reads frames one at a time from an async byte stream.
///
/// The reader never resynchronizes: after any error the stream position is
/// unknown and the reader should be dropped.
pub struct FrameReader<R> {
    inner: R,
    max_payload: u64,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_payload: u64::MAX,
            bytes_read: 0,
        }
    }

    /// Reject frames announcing more than `max` payload bytes.
    pub fn with_max_payload(mut self, max: u64) -> Self {
        self.max_payload = max;
        self
    }

    /// Total bytes consumed from the stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the stream ends mid-frame, or a
    /// decode error for an invalid header
    pub async fn read_frame(&mut self) -> Result<Option<SegmentFrame>, CodecError> {
        let mut preamble = [0u8; PREAMBLE_LEN];
        let got = self.fill(&mut preamble).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < PREAMBLE_LEN {
            return Err(truncated(PREAMBLE_LEN, got));
        }

        let mut preamble = &preamble[..];
        let index = preamble.get_u32();
        let name_len = preamble.get_u32() as usize;
        if name_len > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong(name_len));
        }

        let mut name = vec![0u8; name_len];
        let got = self.fill(&mut name).await?;
        if got < name_len {
            return Err(truncated(name_len, got));
        }
        let name = String::from_utf8(name).map_err(|_| CodecError::InvalidName)?;

        let mut len_field = [0u8; 8];
        let got = self.fill(&mut len_field).await?;
        if got < len_field.len() {
            return Err(truncated(len_field.len(), got));
        }
        let payload_len = u64::from_be_bytes(len_field);
        if payload_len > self.max_payload {
            return Err(CodecError::PayloadTooLarge(payload_len));
        }

        let payload = self.read_payload(payload_len).await?;

        Ok(Some(SegmentFrame {
            index,
            name,
            payload: payload.freeze(),
        }))
    }

    /// Accumulate exactly `len` payload bytes in bounded reads.
    async fn read_payload(&mut self, len: u64) -> Result<BytesMut, CodecError> {
        let total = usize::try_from(len).map_err(|_| CodecError::PayloadTooLarge(len))?;
        let mut payload = BytesMut::with_capacity(total.min(INITIAL_PAYLOAD_CAPACITY));
        let mut chunk = vec![0u8; READ_CHUNK.min(total.max(1))];

        while payload.len() < total {
            let want = (total - payload.len()).min(chunk.len());
            let n = self.inner.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(truncated(total, payload.len()));
            }
            payload.extend_from_slice(&chunk[..n]);
            self.bytes_read += n as u64;
        }

        Ok(payload)
    }

    /// Read until `buf` is full or EOF; returns the number of bytes read.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.bytes_read += filled as u64;
        Ok(filled)
    }
}

fn truncated(expected: usize, got: usize) -> CodecError {
    CodecError::Truncated {
        expected: expected as u64,
        got: got as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, server) = duplex(64);
        let frames = vec![
            SegmentFrame::new(0, "chunk_000.mp4", vec![1u8; 300]),
            SegmentFrame::new(1, "chunk_001.mp4", Vec::new()),
            SegmentFrame::new(2, "chunk_002.mp4", vec![2u8; 7]),
        ];

        let expected = frames.clone();
        let writer = tokio::spawn(async move {
            for frame in &frames {
                write_frame(&mut client, frame).await.unwrap();
            }
        });

        let mut reader = FrameReader::new(server);
        for want in &expected {
            let got = reader.read_frame().await.unwrap().unwrap();
            assert_eq!(&got, want);
        }
        writer.await.unwrap();

        // Writer dropped: clean EOF on a boundary.
        assert!(reader.read_frame().await.unwrap().is_none());
        let total: usize = expected.iter().map(SegmentFrame::encoded_len).sum();
        assert_eq!(reader.bytes_read(), total as u64);
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let frame = SegmentFrame::new(5, "chunk_005.mp4", vec![9u8; 50]);
        let bytes = encode_frame(&frame).unwrap();
        let cut = &bytes[..bytes.len() - 10];

        let mut reader = FrameReader::new(cut);
        match reader.read_frame().await {
            Err(CodecError::Truncated { expected, got }) => {
                assert_eq!(expected, 50);
                assert_eq!(got, 40);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_preamble() {
        let data: &[u8] = &[0, 0, 0];
        let mut reader = FrameReader::new(data);
        assert!(matches!(
            reader.read_frame().await,
            Err(CodecError::Truncated {
                expected: 8,
                got: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_max_payload_guard() {
        let frame = SegmentFrame::new(1, "a", vec![0u8; 100]);
        let bytes = encode_frame(&frame).unwrap();
        let mut reader = FrameReader::new(&bytes[..]).with_max_payload(99);
        assert!(matches!(
            reader.read_frame().await,
            Err(CodecError::PayloadTooLarge(100))
        ));
    }
}
