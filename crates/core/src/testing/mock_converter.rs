//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::converter::{
    Converter, MediaInfo, TranscodeError, TranscodeJob, TranscodeProgress, TranscodeResult,
};

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track transcode jobs for assertions
/// - Script failures and probe results
/// - Simulate progress updates and latency
/// - Hang until cancelled, leaving a partial output file behind so
///   cleanup paths are exercised
#[derive(Debug, Clone)]
pub struct MockConverter {
    /// Recorded transcode jobs.
    transcodes: Arc<RwLock<Vec<TranscodeJob>>>,
    /// Pre-configured probe results by path.
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    /// If set, the next transcode fails with this error. Consumed on use.
    next_error: Arc<RwLock<Option<TranscodeError>>>,
    /// Whether transcodes should block until cancellation.
    hang: Arc<RwLock<bool>>,
    /// Size of the fake sanitized output in bytes.
    output_bytes: Arc<RwLock<u64>>,
    /// Simulated transcode duration in milliseconds.
    transcode_duration_ms: Arc<RwLock<u64>>,
    /// Whether to send progress updates during transcoding.
    send_progress: Arc<RwLock<bool>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            transcodes: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            hang: Arc::new(RwLock::new(false)),
            output_bytes: Arc::new(RwLock::new(512)),
            transcode_duration_ms: Arc::new(RwLock::new(10)),
            send_progress: Arc::new(RwLock::new(true)),
        }
    }

    /// Get all recorded transcode jobs.
    pub async fn recorded_transcodes(&self) -> Vec<TranscodeJob> {
        self.transcodes.read().await.clone()
    }

    /// Get the number of transcodes performed.
    pub async fn transcode_count(&self) -> usize {
        self.transcodes.read().await.len()
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Make the next transcode fail with the given error.
    pub async fn set_next_error(&self, error: TranscodeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make transcodes block until their token is cancelled. A partial
    /// output file is written first.
    pub async fn set_hang(&self, hang: bool) {
        *self.hang.write().await = hang;
    }

    /// Set the size of the fake sanitized output.
    pub async fn set_output_bytes(&self, bytes: u64) {
        *self.output_bytes.write().await = bytes;
    }

    /// Set the simulated transcode duration.
    pub async fn set_transcode_duration_ms(&self, ms: u64) {
        *self.transcode_duration_ms.write().await = ms;
    }

    /// Enable or disable progress updates.
    pub async fn set_send_progress(&self, enabled: bool) {
        *self.send_progress.write().await = enabled;
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError> {
        if let Some(info) = self.probe_results.read().await.get(path) {
            return Ok(info.clone());
        }
        let size_bytes = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs: 60.0,
        })
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: mpsc::Sender<TranscodeProgress>,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError> {
        self.transcodes.write().await.push(job.clone());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if *self.hang.read().await {
            // Leave a partial encode on disk, as a killed ffmpeg would.
            tokio::fs::write(&job.output_path, b"partial").await?;
            cancel.cancelled().await;
            return Err(TranscodeError::Cancelled);
        }

        let duration_ms = *self.transcode_duration_ms.read().await;
        let send_progress = *self.send_progress.read().await;
        for step in 1..=4u64 {
            if send_progress {
                let _ = progress.try_send(TranscodeProgress {
                    job_id: job.job_id,
                    percent: Some(step as f32 * 25.0),
                    out_time_secs: step as f64 * 15.0,
                    fps: Some(30.0),
                    speed: Some(2.0),
                    eta_secs: Some(4 - step),
                });
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(TranscodeError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(duration_ms / 4)) => {}
            }
        }

        let bytes = *self.output_bytes.read().await;
        tokio::fs::write(&job.output_path, vec![0u8; bytes as usize]).await?;

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: bytes,
            duration_ms,
        })
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use tempfile::TempDir;

    fn job_in(dir: &TempDir, id: u64) -> TranscodeJob {
        TranscodeJob {
            job_id: JobId::new(id),
            input_path: dir.path().join("in.mp4"),
            output_path: dir.path().join("out.mp4"),
        }
    }

    #[tokio::test]
    async fn test_transcode_writes_output() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_output_bytes(256).await;

        let (tx, mut rx) = mpsc::channel(16);
        let result = converter
            .transcode(job_in(&dir, 1), tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output_size_bytes, 256);
        assert_eq!(
            tokio::fs::metadata(&result.output_path).await.unwrap().len(),
            256
        );
        assert!(rx.recv().await.is_some());
        assert_eq!(converter.transcode_count().await, 1);
    }

    #[tokio::test]
    async fn test_next_error_consumed_once() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter
            .set_next_error(TranscodeError::DiskFull {
                message: "no space left".to_string(),
            })
            .await;

        let (tx, _rx) = mpsc::channel(16);
        let result = converter
            .transcode(job_in(&dir, 1), tx, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TranscodeError::DiskFull { .. })));

        let (tx, _rx) = mpsc::channel(16);
        assert!(converter
            .transcode(job_in(&dir, 2), tx, CancellationToken::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_hang_leaves_partial_output() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_hang(true).await;

        let (tx, _rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let job = job_in(&dir, 1);
        let output_path = job.output_path.clone();

        let transcode = converter.transcode(job, tx, token.clone());
        tokio::pin!(transcode);

        tokio::select! {
            _ = &mut transcode => panic!("transcode should still be hanging"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        assert!(output_path.exists());

        token.cancel();
        assert!(matches!(transcode.await, Err(TranscodeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_probe_prefers_scripted_result() {
        let converter = MockConverter::new();
        let path = PathBuf::from("/media/file.mp4");
        converter
            .set_probe_result(
                &path,
                MediaInfo {
                    path: path.clone(),
                    size_bytes: 9000,
                    duration_secs: 120.0,
                },
            )
            .await;

        let info = converter.probe(&path).await.unwrap();
        assert_eq!(info.size_bytes, 9000);
        assert_eq!(info.duration_secs, 120.0);
    }
}
