//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::JobId;

/// A request to sanitize one raw artifact into an output file.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Job this transcode belongs to.
    pub job_id: JobId,
    /// Raw artifact to read.
    pub input_path: PathBuf,
    /// Where to write the sanitized file. The caller is responsible for
    /// choosing a location that can later be renamed into the clean
    /// output directory.
    pub output_path: PathBuf,
}

/// Successful transcode outcome.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub job_id: JobId,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}

/// Progress update emitted during transcoding.
///
/// Fields ffmpeg has not reported yet are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeProgress {
    pub job_id: JobId,
    /// 0..100, derived from the probed input duration when available.
    pub percent: Option<f32>,
    /// Position in the output stream, seconds.
    pub out_time_secs: f64,
    /// Encoder frame rate.
    pub fps: Option<f32>,
    /// Realtime speed multiplier, e.g. 2.5 for `speed=2.5x`.
    pub speed: Option<f32>,
    /// Estimated seconds remaining.
    pub eta_secs: Option<u64>,
}

/// Minimal media information from ffprobe, enough for progress math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: f64,
}
