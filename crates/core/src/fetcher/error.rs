//! Error types for the fetcher module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching a reference.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Fetch binary not found.
    #[error("fetch backend not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// Network-level failure (DNS, connection, HTTP 5xx, timeouts mid-transfer).
    #[error("network failure: {message}")]
    Network { message: String },

    /// The reference is not something the backend can retrieve.
    #[error("unsupported source: {message}")]
    UnsupportedSource { message: String },

    /// The remote service throttled or rate-limited the request.
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The backend exited successfully but reported no output file.
    #[error("fetch produced no output file")]
    MissingOutput,

    /// Fetch exceeded the configured timeout.
    #[error("fetch timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The job was cancelled by the operator. Informational, not a fault.
    #[error("fetch cancelled")]
    Cancelled,

    /// I/O error while supervising the subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failed in a way we could not classify.
    #[error("fetch failed: {message}")]
    Unknown { message: String },
}

impl FetchError {
    /// Stable kind tag surfaced to the display layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::Network { .. } => "network",
            Self::UnsupportedSource { .. } => "unsupported_source",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::MissingOutput => "missing_output",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Classifies a nonzero backend exit from its captured output.
    pub fn classify(output: &str) -> Self {
        let lowered = output.to_lowercase();

        if lowered.contains("http error 429")
            || lowered.contains("rate-limit")
            || lowered.contains("rate limit")
            || lowered.contains("too many requests")
        {
            return Self::QuotaExceeded {
                message: last_error_line(output),
            };
        }

        if lowered.contains("unsupported url")
            || lowered.contains("is not a valid url")
            || lowered.contains("no video formats")
        {
            return Self::UnsupportedSource {
                message: last_error_line(output),
            };
        }

        if lowered.contains("unable to download")
            || lowered.contains("connection")
            || lowered.contains("timed out")
            || lowered.contains("name or service not known")
            || lowered.contains("http error 5")
        {
            return Self::Network {
                message: last_error_line(output),
            };
        }

        Self::Unknown {
            message: last_error_line(output),
        }
    }
}

/// Picks the most useful line to surface: the last one mentioning ERROR,
/// or the last non-empty line.
fn last_error_line(output: &str) -> String {
    let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "no output captured".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network() {
        let err = FetchError::classify("ERROR: unable to download video data: timed out");
        assert!(matches!(err, FetchError::Network { .. }));
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn test_classify_unsupported() {
        let err = FetchError::classify("ERROR: Unsupported URL: http://example.com");
        assert!(matches!(err, FetchError::UnsupportedSource { .. }));
    }

    #[test]
    fn test_classify_quota() {
        let err = FetchError::classify("ERROR: HTTP Error 429: Too Many Requests");
        assert!(matches!(err, FetchError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_classify_unknown() {
        let err = FetchError::classify("something inexplicable happened");
        assert!(matches!(err, FetchError::Unknown { .. }));
        assert_eq!(err.kind(), "unknown");
    }

    #[test]
    fn test_last_error_line_prefers_error_marker() {
        let output = "warning: something\nERROR: the real cause\ntrailing noise";
        let err = FetchError::classify(output);
        if let FetchError::Unknown { message } = err {
            assert_eq!(message, "ERROR: the real cause");
        } else {
            panic!("expected unknown classification");
        }
    }
}
