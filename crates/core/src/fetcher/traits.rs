//! Trait definitions for the fetcher module.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;
use super::types::{FetchEvent, FetchJob, FetchOutput};

/// A backend that retrieves raw media for a reference.
///
/// Implementations stream [`FetchEvent`]s over the provided channel while
/// running and must observe the cancellation token: on cancellation the
/// backend terminates its work, cleans nothing (the caller owns artifact
/// cleanup), and returns [`FetchError::Cancelled`] within a bounded grace
/// period.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the name of this fetcher implementation.
    fn name(&self) -> &str;

    /// Fetches the reference into the destination directory.
    ///
    /// If the event receiver is dropped, fetching continues without
    /// progress reporting.
    async fn fetch(
        &self,
        job: FetchJob,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<FetchOutput, FetchError>;

    /// Validates that the fetcher is properly configured and ready.
    async fn validate(&self) -> Result<(), FetchError>;
}
