//! Segcast - live media segment broadcaster
//!
//! This library crate exposes the host and receiver for integration testing.

pub mod config;
pub mod encoder;
pub mod host;
pub mod paths;
pub mod receiver;
pub mod server;
pub mod state;
pub mod watch;
