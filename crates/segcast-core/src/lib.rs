//! Segcast-Core: shared types, naming rules, and error handling.
//!
//! This crate provides the pieces every other segcast crate agrees on:
//!
//! - **Segments**: the immutable [`Segment`] descriptor produced by the watcher
//! - **Naming**: [`SegmentPattern`] parses `<prefix><index><extension>` file names
//! - **Connections**: typed [`ConnectionId`] and the [`ConnectionState`] machine
//! - **Error Handling**: the failure taxonomy shared by server and receiver
//!
//! # Examples
//!
//! ```
//! use segcast_core::{SegmentPattern, NameMatch};
//!
//! let pattern = SegmentPattern::new("chunk_", "mp4");
//! assert_eq!(pattern.classify("chunk_007.mp4"), NameMatch::Segment(7));
//! assert_eq!(pattern.classify("playlist.m3u8"), NameMatch::Unrelated);
//! ```

pub mod error;
pub mod ids;
pub mod segment;
pub mod types;

pub use error::{Error, Result};
pub use ids::ConnectionId;
pub use segment::{NameMatch, Segment, SegmentPattern};
pub use types::ConnectionState;
