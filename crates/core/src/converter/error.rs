//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during transcoding.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// FFmpeg binary not found.
    #[error("ffmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("ffprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The input's codec cannot be decoded or re-encoded.
    #[error("unsupported codec: {message}")]
    UnsupportedCodec { message: String },

    /// The target filesystem ran out of space.
    #[error("disk full: {message}")]
    DiskFull { message: String },

    /// The input file is damaged or truncated.
    #[error("corrupt input: {message}")]
    CorruptInput { message: String },

    /// Failed to probe the input file.
    #[error("failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Transcode exceeded the configured timeout.
    #[error("transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The job was cancelled by the operator. Informational, not a fault.
    #[error("transcode cancelled")]
    Cancelled,

    /// I/O error while supervising the subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failed in a way we could not classify.
    #[error("transcode failed: {message}")]
    Unknown { message: String },
}

impl TranscodeError {
    /// Stable kind tag surfaced to the display layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FfmpegNotFound { .. } => "ffmpeg_not_found",
            Self::FfprobeNotFound { .. } => "ffprobe_not_found",
            Self::InputNotFound { .. } => "input_not_found",
            Self::UnsupportedCodec { .. } => "unsupported_codec",
            Self::DiskFull { .. } => "disk_full",
            Self::CorruptInput { .. } => "corrupt_input",
            Self::ProbeFailed { .. } => "probe_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Classifies a nonzero ffmpeg exit from its captured output.
    pub fn classify(output: &str) -> Self {
        let lowered = output.to_lowercase();
        let message = last_line(output);

        if lowered.contains("no space left") {
            return Self::DiskFull { message };
        }
        if lowered.contains("invalid data found")
            || lowered.contains("moov atom not found")
            || lowered.contains("truncat")
        {
            return Self::CorruptInput { message };
        }
        if lowered.contains("unknown encoder")
            || lowered.contains("decoder not found")
            || lowered.contains("unsupported codec")
            || lowered.contains("not currently supported")
        {
            return Self::UnsupportedCodec { message };
        }

        Self::Unknown { message }
    }
}

fn last_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .next_back()
        .unwrap_or("no output captured")
        .to_string()
}
