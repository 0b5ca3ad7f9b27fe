//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the ffmpeg based converter.
///
/// The encode profile itself is fixed (see `ffmpeg.rs`); only the
/// supervision knobs are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Timeout for a single transcode in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long to wait for the subprocess to exit after a kill before
    /// giving up on it.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// FFmpeg log level (quiet, error, warning, info, ...).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

fn default_kill_grace() -> u64 {
    5
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout(),
            kill_grace_secs: default_kill_grace(),
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Creates a config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the kill grace period in seconds.
    pub fn with_kill_grace(mut self, kill_grace_secs: u64) -> Self {
        self.kill_grace_secs = kill_grace_secs;
        self
    }
}
