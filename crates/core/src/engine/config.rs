//! Configuration for the job engine.

use std::path::PathBuf;

use crate::config::StationConfig;

/// Configuration for the job engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of jobs allowed past the queue at once.
    pub max_concurrent_tasks: usize,

    /// Working directory for raw artifacts and intermediate files.
    /// Final output paths come from the filename resolver.
    pub download_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(max_concurrent_tasks: usize, download_dir: PathBuf) -> Self {
        Self {
            max_concurrent_tasks,
            download_dir,
        }
    }
}

impl From<&StationConfig> for EngineConfig {
    fn from(config: &StationConfig) -> Self {
        Self {
            max_concurrent_tasks: config.max_concurrent_tasks,
            download_dir: config.download_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_station_config() {
        let station = StationConfig::with_dirs(PathBuf::from("/raw"), PathBuf::from("/clean"));
        let config = EngineConfig::from(&station);
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.download_dir, PathBuf::from("/raw"));
    }
}
