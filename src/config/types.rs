use segcast_core::SegmentPattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds a single frame write may stall before the peer is dropped
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Frames buffered per live connection before it counts as lagging
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds to wait for connection tasks to finish during shutdown
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Seconds to keep serving after the last segment has been published
    #[serde(default = "default_linger_secs")]
    pub linger_secs: u64,
}

impl ServerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_secs(self.linger_secs)
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    65432
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn default_drain_timeout_secs() -> u64 {
    3
}

fn default_linger_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_timeout_secs: default_send_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            drain_timeout_secs: default_drain_timeout_secs(),
            linger_secs: default_linger_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Milliseconds between directory scans
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_extension")]
    pub extension: String,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pattern(&self) -> SegmentPattern {
        SegmentPattern::new(self.prefix.clone(), &self.extension)
    }
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_prefix() -> String {
    "chunk_".to_string()
}

fn default_extension() -> String {
    "mp4".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            prefix: default_prefix(),
            extension: default_extension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Directory the encoder writes segments into. Emptied on every run.
    #[serde(default = "default_encoder_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_segment_time_secs")]
    pub segment_time_secs: u32,

    /// Container passed to ffmpeg's `-segment_format`
    #[serde(default = "default_segment_format")]
    pub format: String,
}

fn default_encoder_output_dir() -> PathBuf {
    PathBuf::from("host_chunks")
}

fn default_segment_time_secs() -> u32 {
    5
}

fn default_segment_format() -> String {
    "mp4".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            output_dir: default_encoder_output_dir(),
            segment_time_secs: default_segment_time_secs(),
            format: default_segment_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiverConfig {
    /// Directory received segments are written into. Emptied on connect.
    #[serde(default = "default_receiver_output_dir")]
    pub output_dir: PathBuf,
}

fn default_receiver_output_dir() -> PathBuf {
    PathBuf::from("participant_received_chunks")
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            output_dir: default_receiver_output_dir(),
        }
    }
}
