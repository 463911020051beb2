//! ffmpeg discovery and supervision.
//!
//! The host runs ffmpeg's segment muxer over the input file, stream-copying
//! the first video and audio track into numbered segment files. The
//! process exiting is the signal that no segment will change any more.

use crate::config::EncoderConfig;
use segcast_core::{Error, Result, SegmentPattern};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

const FFMPEG: &str = "ffmpeg";

/// Lines of ffmpeg stderr kept for the error report.
const STDERR_TAIL_LINES: usize = 40;

/// Availability of an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Find ffmpeg: the configured path if it exists, otherwise `PATH`.
pub fn locate_ffmpeg(config: &EncoderConfig) -> Result<PathBuf> {
    if let Some(path) = &config.ffmpeg_path {
        if path.exists() {
            return Ok(path.clone());
        }
        tracing::warn!("Configured ffmpeg not found at {:?}, searching PATH", path);
    }

    which::which(FFMPEG)
        .map_err(|_| Error::tool(FFMPEG, "ffmpeg not found; is it installed and in PATH?"))
}

/// Check every tool the host needs.
pub fn check_tools(config: &EncoderConfig) -> Vec<ToolInfo> {
    match locate_ffmpeg(config) {
        Ok(path) => vec![ToolInfo {
            name: FFMPEG.to_string(),
            available: true,
            version: detect_version(&path),
            path: Some(path),
        }],
        Err(_) => vec![ToolInfo {
            name: FFMPEG.to_string(),
            available: false,
            version: None,
            path: None,
        }],
    }
}

/// First line of `ffmpeg -version`.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

/// Arguments for segmenting `input` into `output_dir`.
pub fn segment_args(
    input: &Path,
    output_dir: &Path,
    pattern: &SegmentPattern,
    config: &EncoderConfig,
) -> Vec<String> {
    let template = output_dir.join(pattern.encoder_template());
    vec![
        "-hide_banner".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a:0".into(),
        "-segment_time".into(),
        config.segment_time_secs.to_string(),
        "-f".into(),
        "segment".into(),
        "-reset_timestamps".into(),
        "1".into(),
        "-segment_format".into(),
        config.format.clone(),
        "-segment_list_flags".into(),
        "+live".into(),
        "-break_non_keyframes".into(),
        "1".into(),
        template.to_string_lossy().into_owned(),
    ]
}

/// A running encoder process.
pub struct Encoder {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl Encoder {
    /// Start `program` with `args`.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        tracing::info!("Starting encoder: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(FFMPEG, format!("failed to spawn: {e}")))?;

        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_stderr(s)));

        Ok(Self { child, stderr })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] with the tail of stderr if the exit status is
    /// non-zero
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        let stderr = self.stderr_tail().await;

        if !status.success() {
            return Err(Error::tool(
                FFMPEG,
                format!("exited with status {}: {}", status, stderr.trim()),
            ));
        }
        Ok(status)
    }

    /// Stop the process and reap it.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to stop encoder: {}", e);
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }

    async fn stderr_tail(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Drain stderr so the pipe never fills, keeping the last few lines.
async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::trace!(target: "segcast::encoder::ffmpeg", "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stopped reading encoder stderr: {}", e);
                break;
            }
        }
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_args() {
        let config = EncoderConfig::default();
        let args = segment_args(
            Path::new("/media/in.mp4"),
            Path::new("host_chunks"),
            &SegmentPattern::default(),
            &config,
        );

        let joined = args.join(" ");
        assert!(joined.starts_with("-hide_banner -i /media/in.mp4 -c copy"));
        assert!(joined.contains("-map 0:v:0 -map 0:a:0"));
        assert!(joined.contains("-segment_time 5"));
        assert!(joined.contains("-f segment"));
        assert!(joined.contains("-segment_format mp4"));
        assert!(joined.contains("-break_non_keyframes 1"));
        assert_eq!(args.last().unwrap(), "host_chunks/chunk_%03d.mp4");
    }

    #[test]
    fn test_missing_configured_path_falls_back() {
        let config = EncoderConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ..Default::default()
        };
        // Either found on PATH or a Tool error; never the bogus path
        match locate_ffmpeg(&config) {
            Ok(path) => assert_ne!(path, PathBuf::from("/nonexistent/ffmpeg")),
            Err(e) => assert!(matches!(e, Error::Tool { .. })),
        }
    }

    #[test]
    fn test_check_tools_reports_ffmpeg() {
        let tools = check_tools(&EncoderConfig::default());
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ffmpeg");
        assert_eq!(tools[0].available, tools[0].path.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_reports_stderr() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let mut encoder = Encoder::spawn(Path::new("/bin/sh"), &args).unwrap();
        let err = encoder.wait().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("boom"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit() {
        let args = vec!["-c".to_string(), "exit 0".to_string()];
        let mut encoder = Encoder::spawn(Path::new("/bin/sh"), &args).unwrap();
        assert!(encoder.wait().await.unwrap().success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_running_process() {
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let mut encoder = Encoder::spawn(Path::new("/bin/sh"), &args).unwrap();
        assert!(encoder.id().is_some());
        encoder.kill().await;
        assert!(encoder.id().is_none());
    }
}
