pub mod config;
pub mod converter;
pub mod engine;
pub mod fetcher;
pub mod job;
pub mod naming;
pub mod progress;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, StationConfig,
};
pub use converter::{
    Converter, ConverterConfig, FfmpegConverter, MediaInfo, TranscodeError, TranscodeJob,
    TranscodeProgress, TranscodeResult,
};
pub use engine::{EngineConfig, EngineError, EngineStatus, JobEngine};
pub use fetcher::{
    FetchError, FetchEvent, FetchJob, FetchOutput, Fetcher, FetcherConfig, YtDlpFetcher,
};
pub use job::{
    CompletionStats, Job, JobError, JobErrorInfo, JobId, JobSnapshot, JobState, TransitionError,
};
pub use naming::{FilenameResolver, NamingError};
pub use progress::{Phase, ProgressAggregator, ProgressSnapshot, Rate, RawProgress};
