//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::TranscodeError;
use super::types::{MediaInfo, TranscodeJob, TranscodeProgress, TranscodeResult};

/// A backend that re-encodes and strips metadata from a raw artifact.
///
/// Implementations stream [`TranscodeProgress`] over the provided channel
/// while running and must observe the cancellation token: on cancellation
/// the backend terminates its work and returns
/// [`TranscodeError::Cancelled`] within a bounded grace period. Partial
/// output cleanup is the caller's responsibility.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Probes a media file for duration and size.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError>;

    /// Sanitizes the input into the output path.
    ///
    /// If the progress receiver is dropped, transcoding continues without
    /// progress reporting.
    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: mpsc::Sender<TranscodeProgress>,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError>;

    /// Validates that the converter is properly configured and ready.
    async fn validate(&self) -> Result<(), TranscodeError>;
}
