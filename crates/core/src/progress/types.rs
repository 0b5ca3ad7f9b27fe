//! Types for the progress module.

use serde::{Deserialize, Serialize};

/// Pipeline phase a progress value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Download,
    Sanitize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Download => "download",
            Phase::Sanitize => "sanitize",
        }
    }
}

/// Throughput measure, unit depends on the emitting backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Rate {
    /// Bytes per second (download phase).
    BytesPerSec(f64),
    /// Frames per second (sanitize phase).
    FramesPerSec(f32),
    /// Realtime multiplier, e.g. ffmpeg's `speed=2.5x`.
    Multiplier(f32),
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rate::BytesPerSec(b) => {
                let mut value = *b;
                for unit in ["B/s", "KiB/s", "MiB/s", "GiB/s"] {
                    if value < 1024.0 {
                        return write!(f, "{:.1}{}", value, unit);
                    }
                    value /= 1024.0;
                }
                write!(f, "{:.1}TiB/s", value)
            }
            Rate::FramesPerSec(fps) => write!(f, "{:.0}fps", fps),
            Rate::Multiplier(x) => write!(f, "{:.1}x", x),
        }
    }
}

/// A raw, possibly incomplete progress observation from a backend.
///
/// Missing fields mean "the backend did not say", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawProgress {
    pub percent: Option<f32>,
    pub rate: Option<Rate>,
    pub eta_secs: Option<u64>,
}

/// Normalized, phase-scoped progress state for display.
///
/// Overwritten on each backend event; the last value is retained for
/// display after the phase completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    /// 0..100, monotonically non-decreasing within a phase.
    pub percent: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_before: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_after: Option<u64>,
}

impl ProgressSnapshot {
    pub fn empty(phase: Phase) -> Self {
        Self {
            phase,
            percent: 0.0,
            rate: None,
            eta_secs: None,
            size_before: None,
            size_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::BytesPerSec(512.0).to_string(), "512.0B/s");
        assert_eq!(Rate::BytesPerSec(3.5 * 1024.0 * 1024.0).to_string(), "3.5MiB/s");
        assert_eq!(Rate::FramesPerSec(29.7).to_string(), "30fps");
        assert_eq!(Rate::Multiplier(2.54).to_string(), "2.5x");
    }

    #[test]
    fn test_snapshot_serialization_omits_unknowns() {
        let snapshot = ProgressSnapshot::empty(Phase::Download);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"phase\":\"download\""));
        assert!(!json.contains("rate"));
        assert!(!json.contains("eta_secs"));
    }
}
