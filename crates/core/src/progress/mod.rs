//! Progress aggregation.
//!
//! Backends emit heterogeneous progress signals (yt-dlp percent/rate/ETA
//! lines, ffmpeg `-progress` key-value output). The aggregator normalizes
//! them into a uniform [`ProgressSnapshot`] per job per phase. It is a pure
//! transformation: no I/O, bounded work per event, independently testable
//! without any real subprocess.

mod aggregator;
mod types;

pub use aggregator::ProgressAggregator;
pub use types::{Phase, ProgressSnapshot, Rate, RawProgress};
