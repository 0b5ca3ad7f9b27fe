use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::ConverterConfig;
use crate::fetcher::FetcherConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub station: StationConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

/// Pipeline configuration, read once at startup.
///
/// There is deliberately no hot-reload: the concurrency limit and directory
/// layout are fixed for the lifetime of the process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationConfig {
    /// Maximum number of jobs executing their stages at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Directory for raw and intermediate artifacts. Safe to wipe.
    pub download_dir: PathBuf,

    /// Directory for final sanitized artifacts only.
    pub output_dir: PathBuf,

    /// How long to wait for a cancelled subprocess to exit before
    /// force-reclaiming its slot.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_cancel_grace() -> u64 {
    5
}

impl StationConfig {
    /// Creates a config rooted at the given directories with defaults
    /// for everything else.
    pub fn with_dirs(download_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            download_dir,
            output_dir,
            cancel_grace_secs: default_cancel_grace(),
        }
    }

    /// Sets the concurrency limit.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
[station]
download_dir = "/data/raw"
output_dir = "/data/clean"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.station.max_concurrent_tasks, 3);
        assert_eq!(config.station.cancel_grace_secs, 5);
        assert_eq!(config.station.download_dir, PathBuf::from("/data/raw"));
        assert_eq!(config.station.output_dir, PathBuf::from("/data/clean"));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
[station]
max_concurrent_tasks = 5
download_dir = "/tmp/raw"
output_dir = "/tmp/clean"
cancel_grace_secs = 10

[fetcher]
binary_path = "/usr/local/bin/yt-dlp"

[converter]
ffmpeg_path = "/usr/local/bin/ffmpeg"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.station.max_concurrent_tasks, 5);
        assert_eq!(config.station.cancel_grace_secs, 10);
        assert_eq!(
            config.fetcher.binary_path,
            PathBuf::from("/usr/local/bin/yt-dlp")
        );
        assert_eq!(
            config.converter.ffmpeg_path,
            PathBuf::from("/usr/local/bin/ffmpeg")
        );
    }

    #[test]
    fn test_deserialize_missing_station_fails() {
        let toml = r#"
[fetcher]
binary_path = "yt-dlp"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder() {
        let station = StationConfig::with_dirs("/a".into(), "/b".into()).with_max_concurrent(1);
        assert_eq!(station.max_concurrent_tasks, 1);
        assert_eq!(station.download_dir, PathBuf::from("/a"));
    }
}
