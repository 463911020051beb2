//! Common error types used throughout segcast.
//!
//! The variants mirror how a failure is handled rather than where it came
//! from: transient filesystem races are retried on the next poll, unparseable
//! names are ignored for good, peer failures evict a single connection, and a
//! bind failure aborts startup.

use std::io;

/// Common error type for segcast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file vanished or could not be inspected mid-poll; retried next poll.
    #[error("Transient I/O error on {path}: {source}")]
    TransientIo {
        /// File that was being inspected.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A file name looked like a segment but its index could not be parsed.
    #[error("Unparseable segment name: {0}")]
    ProtocolParse(String),

    /// The peer closed the connection.
    #[error("Peer disconnected: {0}")]
    PeerDisconnected(String),

    /// A send to the peer did not complete in time.
    #[error("Peer timed out: {0}")]
    PeerTimeout(String),

    /// The peer reset the connection or the pipe broke.
    #[error("Peer reset: {0}")]
    PeerReset(String),

    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    BindFailure {
        /// Address that was requested.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An external tool (ffmpeg) failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new TransientIo error.
    pub fn transient(path: impl Into<String>, source: io::Error) -> Self {
        Self::TransientIo {
            path: path.into(),
            source,
        }
    }

    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify a socket error raised while sending to a peer.
    ///
    /// Resets, aborts and broken pipes are all [`Error::PeerReset`]; a timed
    /// out write is [`Error::PeerTimeout`]; an orderly close seen as
    /// `UnexpectedEof` or `WriteZero` is [`Error::PeerDisconnected`]. Anything
    /// else is reported as a reset since the connection is unusable either way.
    pub fn from_send_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::PeerTimeout(err.to_string())
            }
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => {
                Self::PeerDisconnected(err.to_string())
            }
            _ => Self::PeerReset(err.to_string()),
        }
    }

    /// Whether this error only concerns a single peer connection.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            Self::PeerDisconnected(_) | Self::PeerTimeout(_) | Self::PeerReset(_)
        )
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ProtocolParse("chunk_x.mp4".into());
        assert_eq!(err.to_string(), "Unparseable segment name: chunk_x.mp4");

        let err = Error::config("port cannot be 0");
        assert_eq!(err.to_string(), "Config error: port cannot be 0");

        let err = Error::tool("ffmpeg", "exited with status 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exited with status 1");
    }

    #[test]
    fn test_send_io_classification() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(Error::from_send_io(reset), Error::PeerReset(_)));

        let pipe = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(Error::from_send_io(pipe), Error::PeerReset(_)));

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(Error::from_send_io(timeout), Error::PeerTimeout(_)));

        let eof = io::Error::new(io::ErrorKind::WriteZero, "closed");
        assert!(matches!(
            Error::from_send_io(eof),
            Error::PeerDisconnected(_)
        ));
    }

    #[test]
    fn test_peer_failure_grouping() {
        assert!(Error::PeerReset("x".into()).is_peer_failure());
        assert!(Error::PeerTimeout("x".into()).is_peer_failure());
        assert!(Error::PeerDisconnected("x".into()).is_peer_failure());
        assert!(!Error::ProtocolParse("x".into()).is_peer_failure());

        let bind = Error::BindFailure {
            addr: "0.0.0.0:1".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(!bind.is_peer_failure());
        assert!(bind.to_string().contains("0.0.0.0:1"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
