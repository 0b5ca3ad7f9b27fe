//! Transcode backend for sanitizing raw media.
//!
//! This module provides the `Converter` trait and the ffmpeg based
//! implementation. Sanitization re-encodes the first video and audio
//! streams with a fixed constant-quality profile and strips metadata and
//! chapter streams. Progress is streamed while the subprocess runs.

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::TranscodeError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{MediaInfo, TranscodeJob, TranscodeProgress, TranscodeResult};
