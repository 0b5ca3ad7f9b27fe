//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::converter::TranscodeError;
use crate::fetcher::FetchError;
use crate::naming::NamingError;
use crate::progress::ProgressSnapshot;

/// Unique identifier for a job, assigned in submission order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct JobId(u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a job.
///
/// State machine flow:
/// ```text
/// Queued -> Downloading -> Downloaded -> Sanitizing -> Completed
///
/// Downloading, Downloaded and Sanitizing can transition to Failed.
/// Any non-terminal state can transition to Cancelled.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a concurrency slot.
    Queued,
    /// Fetch backend is retrieving the raw artifact.
    Downloading,
    /// Raw artifact on disk, waiting for sanitization to begin.
    Downloaded,
    /// Converter is re-encoding the artifact.
    Sanitizing,
    /// Clean file placed in the output directory (terminal).
    Completed,
    /// A pipeline stage failed (terminal).
    Failed,
    /// Cancelled by the operator (terminal).
    Cancelled,
}

impl JobState {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the job holds a concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Downloading | Self::Downloaded | Self::Sanitizing)
    }

    /// Returns true if the state machine permits moving to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Queued, Downloading) => true,
            (Downloading, Downloaded) | (Downloading, Failed) => true,
            (Downloaded, Sanitizing) | (Downloaded, Failed) => true,
            (Sanitizing, Completed) | (Sanitizing, Failed) => true,
            _ => false,
        }
    }

    /// Returns the state as a string (for filtering and display).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Sanitizing => "sanitizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted state transition the machine does not permit.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Failure from any pipeline stage, attached to a failed job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("sanitize failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("naming failed: {0}")]
    Naming(#[from] NamingError),
}

impl JobError {
    /// Stable two-part kind tag, e.g. "fetch/network".
    pub fn kind(&self) -> String {
        match self {
            Self::Fetch(e) => format!("fetch/{}", e.kind()),
            Self::Transcode(e) => format!("sanitize/{}", e.kind()),
            Self::Naming(_) => "naming/filesystem_rejected".to_string(),
        }
    }

    /// Returns true if the underlying cause was a cancellation rather
    /// than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError::Cancelled) | Self::Transcode(TranscodeError::Cancelled)
        )
    }
}

/// Serializable description of a job failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&JobError> for JobErrorInfo {
    fn from(error: &JobError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Statistics for a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionStats {
    /// Size of the raw fetched artifact in bytes.
    pub raw_bytes: u64,
    /// Size of the sanitized output in bytes.
    pub clean_bytes: u64,
    /// Size reduction as a percentage of the raw size. Negative when
    /// the re-encode grew the file.
    pub reduction_percent: f32,
}

impl CompletionStats {
    pub fn compute(raw_bytes: u64, clean_bytes: u64) -> Self {
        let reduction_percent = if raw_bytes > 0 {
            ((raw_bytes as f64 - clean_bytes as f64) / raw_bytes as f64 * 100.0) as f32
        } else {
            0.0
        };
        Self {
            raw_bytes,
            clean_bytes,
            reduction_percent,
        }
    }
}

/// A job tracking one media reference through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,

    /// The media reference (URL) given at submission.
    pub reference: String,

    /// Current state.
    pub state: JobState,

    /// Human readable title, known once the fetcher reports it. Until
    /// then the reference stands in.
    pub title: Option<String>,

    /// Raw artifact path, set once fetched.
    pub raw_path: Option<PathBuf>,

    /// Final output path, reserved once the title is known.
    pub output_path: Option<PathBuf>,

    /// Latest download progress.
    pub download_progress: Option<ProgressSnapshot>,

    /// Latest sanitize progress.
    pub sanitize_progress: Option<ProgressSnapshot>,

    /// Failure details, set when the job enters Failed.
    pub error: Option<JobErrorInfo>,

    /// Completion statistics, set when the job enters Completed.
    pub stats: Option<CompletionStats>,

    /// 1 for the first run, incremented for each retry lineage member.
    pub attempt: u32,

    /// The job this one retries, if any.
    pub retry_of: Option<JobId>,

    pub created_at: DateTime<Utc>,

    /// Set when the job enters a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a new queued job.
    pub fn new(id: JobId, reference: impl Into<String>) -> Self {
        Self {
            id,
            reference: reference.into(),
            state: JobState::Queued,
            title: None,
            raw_path: None,
            output_path: None,
            download_progress: None,
            sanitize_progress: None,
            error: None,
            stats: None,
            attempt: 1,
            retry_of: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Creates a queued job retrying a previous one.
    pub fn retry_of(id: JobId, previous: &Job) -> Self {
        let mut job = Self::new(id, previous.reference.clone());
        job.attempt = previous.attempt + 1;
        job.retry_of = Some(previous.id);
        job
    }

    /// Moves the job to `next`, enforcing the state machine.
    ///
    /// Entering a terminal state records the finish time.
    pub fn transition(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Title for display, falling back to the reference while the
    /// fetcher has not reported one yet.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.reference)
    }

    /// Produces a serializable snapshot of the current state.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            reference: self.reference.clone(),
            state: self.state,
            title: self.title.clone(),
            output_path: self.output_path.clone(),
            download_progress: self.download_progress.clone(),
            sanitize_progress: self.sanitize_progress.clone(),
            error: self.error.clone(),
            stats: self.stats,
            attempt: self.attempt,
            retry_of: self.retry_of,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// Point-in-time view of a job, safe to hand to display layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub reference: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitize_progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<CompletionStats>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut job = Job::new(JobId::new(1), "https://example.com/v/1");
        assert_eq!(job.state, JobState::Queued);

        job.transition(JobState::Downloading).unwrap();
        job.transition(JobState::Downloaded).unwrap();
        job.transition(JobState::Sanitizing).unwrap();
        job.transition(JobState::Completed).unwrap();

        assert!(job.state.is_terminal());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut job = Job::new(JobId::new(1), "ref");
        let err = job.transition(JobState::Sanitizing).unwrap_err();
        assert_eq!(err.from, JobState::Queued);
        assert_eq!(err.to, JobState::Sanitizing);
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_queued_cannot_fail() {
        let mut job = Job::new(JobId::new(1), "ref");
        assert!(job.transition(JobState::Failed).is_err());
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for intermediate in [
            JobState::Queued,
            JobState::Downloading,
            JobState::Downloaded,
            JobState::Sanitizing,
        ] {
            assert!(intermediate.can_transition_to(JobState::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            for next in [
                JobState::Queued,
                JobState::Downloading,
                JobState::Downloaded,
                JobState::Sanitizing,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_failures_from_mid_pipeline_only() {
        assert!(JobState::Downloading.can_transition_to(JobState::Failed));
        assert!(JobState::Downloaded.can_transition_to(JobState::Failed));
        assert!(JobState::Sanitizing.can_transition_to(JobState::Failed));
        assert!(!JobState::Completed.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_retry_lineage() {
        let mut first = Job::new(JobId::new(1), "ref");
        first.transition(JobState::Downloading).unwrap();
        first.transition(JobState::Failed).unwrap();

        let retry = Job::retry_of(JobId::new(2), &first);
        assert_eq!(retry.state, JobState::Queued);
        assert_eq!(retry.reference, "ref");
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.retry_of, Some(JobId::new(1)));
        assert!(retry.error.is_none());
        assert!(retry.output_path.is_none());
    }

    #[test]
    fn test_completion_stats_reduction() {
        let stats = CompletionStats::compute(1000, 400);
        assert!((stats.reduction_percent - 60.0).abs() < 0.01);

        let grew = CompletionStats::compute(400, 1000);
        assert!(grew.reduction_percent < 0.0);

        let empty = CompletionStats::compute(0, 100);
        assert_eq!(empty.reduction_percent, 0.0);
    }

    #[test]
    fn test_display_title_falls_back_to_reference() {
        let mut job = Job::new(JobId::new(1), "https://example.com/v/1");
        assert_eq!(job.display_title(), "https://example.com/v/1");
        job.title = Some("A Video".to_string());
        assert_eq!(job.display_title(), "A Video");
    }

    #[test]
    fn test_error_kind_tags() {
        let err: JobError = FetchError::Network {
            message: "unreachable".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "fetch/network");
        assert!(!err.is_cancellation());

        let cancelled: JobError = TranscodeError::Cancelled.into();
        assert_eq!(cancelled.kind(), "sanitize/cancelled");
        assert!(cancelled.is_cancellation());
    }

    #[test]
    fn test_snapshot_serialization() {
        let job = Job::new(JobId::new(7), "ref");
        let snapshot = job.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"state\":\"queued\""));
        assert!(!json.contains("error"));

        let parsed: JobSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, JobId::new(7));
        assert_eq!(parsed.state, JobState::Queued);
    }

    #[test]
    fn test_job_id_display_and_order() {
        assert_eq!(JobId::new(42).to_string(), "42");
        assert!(JobId::new(1) < JobId::new(2));
    }
}
