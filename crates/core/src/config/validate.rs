use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Station section exists (enforced by serde)
/// - Concurrency limit is at least 1
/// - Download and output directories are distinct
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.station.max_concurrent_tasks == 0 {
        return Err(ConfigError::ValidationError(
            "station.max_concurrent_tasks must be at least 1".to_string(),
        ));
    }

    if config.station.download_dir == config.station.output_dir {
        return Err(ConfigError::ValidationError(
            "station.download_dir and station.output_dir must differ".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::converter::ConverterConfig;
    use crate::fetcher::FetcherConfig;

    fn base_config() -> Config {
        Config {
            station: StationConfig::with_dirs("/data/raw".into(), "/data/clean".into()),
            fetcher: FetcherConfig::default(),
            converter: ConverterConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = base_config();
        config.station.max_concurrent_tasks = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_same_dirs_fails() {
        let mut config = base_config();
        config.station.output_dir = config.station.download_dir.clone();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
