//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::fetcher::{FetchError, FetchEvent, FetchJob, FetchOutput, Fetcher};
use crate::progress::{Rate, RawProgress};

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Track fetch jobs for assertions
/// - Script per-reference titles and failures
/// - Simulate progress events and latency
/// - Hang until cancelled to exercise cancellation paths
///
/// Fetched "artifacts" are real files written into the job's
/// destination directory so downstream filesystem handling works.
#[derive(Debug, Clone)]
pub struct MockFetcher {
    /// Recorded fetch jobs.
    fetches: Arc<RwLock<Vec<FetchJob>>>,
    /// Titles to report, by reference. Unknown references get a title
    /// derived from the reference itself.
    titles: Arc<RwLock<HashMap<String, String>>>,
    /// Scripted failures, by reference. Consumed on use.
    errors: Arc<RwLock<HashMap<String, FetchError>>>,
    /// References that should block until cancellation.
    hang_refs: Arc<RwLock<HashMap<String, ()>>>,
    /// Size of the fake raw artifact in bytes.
    artifact_bytes: Arc<RwLock<u64>>,
    /// Simulated fetch duration in milliseconds.
    fetch_duration_ms: Arc<RwLock<u64>>,
    /// Whether to emit progress events during the fetch.
    send_progress: Arc<RwLock<bool>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self {
            fetches: Arc::new(RwLock::new(Vec::new())),
            titles: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            hang_refs: Arc::new(RwLock::new(HashMap::new())),
            artifact_bytes: Arc::new(RwLock::new(1024)),
            fetch_duration_ms: Arc::new(RwLock::new(10)),
            send_progress: Arc::new(RwLock::new(true)),
        }
    }

    /// Get all recorded fetch jobs.
    pub async fn recorded_fetches(&self) -> Vec<FetchJob> {
        self.fetches.read().await.clone()
    }

    /// Get the number of fetches performed.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Script the title reported for a reference.
    pub async fn set_title(&self, reference: impl Into<String>, title: impl Into<String>) {
        self.titles
            .write()
            .await
            .insert(reference.into(), title.into());
    }

    /// Script a failure for a reference. Consumed by the next fetch of
    /// that reference.
    pub async fn set_error(&self, reference: impl Into<String>, error: FetchError) {
        self.errors.write().await.insert(reference.into(), error);
    }

    /// Make fetches of a reference block until their token is cancelled.
    pub async fn set_hang(&self, reference: impl Into<String>) {
        self.hang_refs.write().await.insert(reference.into(), ());
    }

    /// Set the size of the fake raw artifact.
    pub async fn set_artifact_bytes(&self, bytes: u64) {
        *self.artifact_bytes.write().await = bytes;
    }

    /// Set the simulated fetch duration.
    pub async fn set_fetch_duration_ms(&self, ms: u64) {
        *self.fetch_duration_ms.write().await = ms;
    }

    /// Enable or disable progress events.
    pub async fn set_send_progress(&self, enabled: bool) {
        *self.send_progress.write().await = enabled;
    }

    async fn title_for(&self, reference: &str) -> String {
        if let Some(title) = self.titles.read().await.get(reference) {
            return title.clone();
        }
        reference
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("mock media")
            .to_string()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        job: FetchJob,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        self.fetches.write().await.push(job.clone());

        if self.hang_refs.read().await.contains_key(&job.reference) {
            // Leave a half-written download behind, as a killed backend
            // would.
            let title = self.title_for(&job.reference).await;
            let partial = job
                .dest_dir
                .join(format!("{}_{}.mp4.part", title, job.file_tag));
            let _ = tokio::fs::write(&partial, b"partial").await;
            cancel.cancelled().await;
            return Err(FetchError::Cancelled);
        }

        if let Some(error) = self.errors.write().await.remove(&job.reference) {
            return Err(error);
        }

        let title = self.title_for(&job.reference).await;
        let _ = events.try_send(FetchEvent::Title(title.clone()));

        let duration_ms = *self.fetch_duration_ms.read().await;
        let send_progress = *self.send_progress.read().await;
        for step in 1..=4u64 {
            if send_progress {
                let _ = events.try_send(FetchEvent::Progress(RawProgress {
                    percent: Some(step as f32 * 25.0),
                    rate: Some(Rate::BytesPerSec(1_048_576.0)),
                    eta_secs: Some(4 - step),
                }));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(duration_ms / 4)) => {}
            }
        }

        let raw_path = job
            .dest_dir
            .join(format!("{}_{}.mp4", title, job.file_tag));
        let bytes = *self.artifact_bytes.read().await;
        tokio::fs::write(&raw_path, vec![0u8; bytes as usize]).await?;

        Ok(FetchOutput { raw_path, title })
    }

    async fn validate(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_writes_artifact_and_reports_title() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        fetcher.set_title("ref-1", "My Video").await;
        fetcher.set_artifact_bytes(2048).await;

        let (tx, mut rx) = mpsc::channel(16);
        let job = FetchJob::new(JobId::new(1), "ref-1", dir.path());
        let output = fetcher
            .fetch(job, tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.title, "My Video");
        assert_eq!(
            tokio::fs::metadata(&output.raw_path).await.unwrap().len(),
            2048
        );
        assert!(matches!(rx.recv().await, Some(FetchEvent::Title(_))));
        assert_eq!(fetcher.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_scripted_error_consumed_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        fetcher
            .set_error(
                "ref-1",
                FetchError::Network {
                    message: "unreachable".to_string(),
                },
            )
            .await;

        let (tx, _rx) = mpsc::channel(16);
        let job = FetchJob::new(JobId::new(1), "ref-1", dir.path());
        let result = fetcher.fetch(job.clone(), tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(FetchError::Network { .. })));

        // The second fetch of the same reference succeeds.
        let (tx, _rx) = mpsc::channel(16);
        assert!(fetcher.fetch(job, tx, CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_hanging_fetch_observes_cancellation() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        fetcher.set_hang("ref-1").await;

        let (tx, _rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let job = FetchJob::new(JobId::new(1), "ref-1", dir.path());

        let fetch = fetcher.fetch(job, tx, token.clone());
        tokio::pin!(fetch);

        tokio::select! {
            _ = &mut fetch => panic!("fetch should still be hanging"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        token.cancel();
        assert!(matches!(fetch.await, Err(FetchError::Cancelled)));

        // The aborted download left a partial file behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        assert_eq!(leftovers.len(), 1);
        assert!(leftovers[0].ends_with(".part"));
    }
}
