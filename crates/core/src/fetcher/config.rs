//! Configuration for the fetch backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the yt-dlp based fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Path to the yt-dlp binary.
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,

    /// Format selection expression passed to `-f`.
    #[serde(default = "default_format")]
    pub format: String,

    /// Timeout for a single fetch in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long to wait for the subprocess to exit after a kill before
    /// giving up on it.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// Additional yt-dlp arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_format() -> String {
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
}

fn default_timeout() -> u64 {
    7200 // 2 hours
}

fn default_kill_grace() -> u64 {
    5
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            format: default_format(),
            timeout_secs: default_timeout(),
            kill_grace_secs: default_kill_grace(),
            extra_args: Vec::new(),
        }
    }
}

impl FetcherConfig {
    /// Creates a config with a custom binary path.
    pub fn with_binary(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            ..Default::default()
        }
    }

    /// Sets the fetch timeout in seconds.
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
