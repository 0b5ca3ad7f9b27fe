//! Job engine implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::converter::{Converter, TranscodeError, TranscodeJob, TranscodeProgress};
use crate::fetcher::{FetchError, FetchEvent, FetchJob, Fetcher};
use crate::job::{CompletionStats, Job, JobError, JobErrorInfo, JobId, JobSnapshot, JobState};
use crate::naming::FilenameResolver;
use crate::progress::{Phase, ProgressAggregator, Rate, RawProgress};

use super::config::EngineConfig;
use super::types::EngineStatus;

/// Capacity of the snapshot broadcast channel. Slow subscribers lag,
/// they do not block the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the per-job backend progress channels.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Error type for engine operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Cancel requested on a job that already finished.
    #[error("job {0} is already in a terminal state")]
    AlreadyTerminal(JobId),

    /// Retry requested on a job that did not fail or get cancelled.
    #[error("job {0} cannot be retried from its current state")]
    NotRetryable(JobId),

    /// Clear requested on a job that has not finished yet.
    #[error("job {0} is still in progress")]
    StillRunning(JobId),

    /// The engine is shutting down and accepts no new work.
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Aggregate counters, updated by workers without taking the registry lock.
#[derive(Default)]
struct EngineStats {
    queued: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

type JobRegistry = Arc<RwLock<HashMap<JobId, Job>>>;

/// Shared access to the registry for progress consumer tasks.
#[derive(Clone)]
struct JobUpdater {
    jobs: JobRegistry,
    events: broadcast::Sender<JobSnapshot>,
}

impl JobUpdater {
    /// Mutates one job and broadcasts the resulting snapshot.
    async fn apply(&self, id: JobId, mutate: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            mutate(job);
            let snapshot = job.snapshot();
            drop(jobs);
            let _ = self.events.send(snapshot);
        }
    }

    /// Consumes fetch backend events, folding progress through a
    /// per-phase aggregator. Returns the aggregator so the caller can
    /// mark the phase complete.
    async fn consume_fetch_events(
        self,
        id: JobId,
        mut rx: mpsc::Receiver<FetchEvent>,
    ) -> ProgressAggregator {
        let mut aggregator = ProgressAggregator::new(Phase::Download);
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Progress(raw) => {
                    let snapshot = aggregator.observe(raw);
                    self.apply(id, move |job| job.download_progress = Some(snapshot))
                        .await;
                }
                FetchEvent::Title(title) => {
                    self.apply(id, move |job| job.title = Some(title)).await;
                }
                FetchEvent::Status(status) => {
                    debug!(job_id = %id, status = %status, "fetch status");
                }
            }
        }
        aggregator
    }

    /// Consumes converter progress updates. Returns the aggregator so
    /// the caller can mark the phase complete.
    async fn consume_transcode_progress(
        self,
        id: JobId,
        raw_bytes: u64,
        mut rx: mpsc::Receiver<TranscodeProgress>,
    ) -> ProgressAggregator {
        let mut aggregator = ProgressAggregator::new(Phase::Sanitize);
        aggregator.set_sizes(Some(raw_bytes), None);
        while let Some(progress) = rx.recv().await {
            let rate = progress
                .speed
                .map(Rate::Multiplier)
                .or(progress.fps.map(Rate::FramesPerSec));
            let snapshot = aggregator.observe(RawProgress {
                percent: progress.percent,
                rate,
                eta_secs: progress.eta_secs,
            });
            self.apply(id, move |job| job.sanitize_progress = Some(snapshot))
                .await;
        }
        aggregator
    }
}

/// The job engine.
///
/// Cheap to clone; all clones share the same registry and slot pool.
pub struct JobEngine<F: Fetcher, C: Converter> {
    shared: Arc<Shared<F, C>>,
}

impl<F: Fetcher, C: Converter> Clone for JobEngine<F, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<F, C> {
    config: EngineConfig,
    fetcher: F,
    converter: C,
    resolver: Arc<FilenameResolver>,
    semaphore: Arc<Semaphore>,
    stats: EngineStats,
    jobs: JobRegistry,
    tokens: RwLock<HashMap<JobId, CancellationToken>>,
    next_id: AtomicU64,
    events: broadcast::Sender<JobSnapshot>,
    shutdown: CancellationToken,
}

impl<F: Fetcher + 'static, C: Converter + 'static> JobEngine<F, C> {
    /// Creates a new engine. No background work starts until the first
    /// submission.
    pub fn new(
        config: EngineConfig,
        fetcher: F,
        converter: C,
        resolver: Arc<FilenameResolver>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                fetcher,
                converter,
                resolver,
                semaphore,
                stats: EngineStats::default(),
                jobs: Arc::new(RwLock::new(HashMap::new())),
                tokens: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Submits a reference for processing and returns the assigned id.
    ///
    /// The job starts in Queued and is admitted in submission order as
    /// slots free up.
    pub async fn submit(&self, reference: impl Into<String>) -> Result<JobId, EngineError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }

        let id = JobId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let job = Job::new(id, reference);
        self.enqueue(job).await;
        Ok(id)
    }

    /// Requests cancellation of a job.
    ///
    /// Returns immediately; the job reaches Cancelled once its current
    /// stage has observed the token. A queued job is cancelled without
    /// any backend ever being invoked.
    pub async fn cancel(&self, id: JobId) -> Result<(), EngineError> {
        {
            let jobs = self.shared.jobs.read().await;
            let job = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
            if job.state.is_terminal() {
                return Err(EngineError::AlreadyTerminal(id));
            }
        }
        if let Some(token) = self.shared.tokens.read().await.get(&id) {
            info!(job_id = %id, "cancellation requested");
            token.cancel();
        }
        Ok(())
    }

    /// Retries a failed or cancelled job as a fresh submission.
    ///
    /// The new job re-enters the queue tail and re-resolves its output
    /// name from scratch; the original job is left untouched.
    pub async fn retry(&self, id: JobId) -> Result<JobId, EngineError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }

        let retry = {
            let jobs = self.shared.jobs.read().await;
            let job = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
            if !matches!(job.state, JobState::Failed | JobState::Cancelled) {
                return Err(EngineError::NotRetryable(id));
            }
            let new_id = JobId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            Job::retry_of(new_id, job)
        };

        let new_id = retry.id;
        info!(job_id = %id, retry_id = %new_id, "retrying job");
        self.enqueue(retry).await;
        Ok(new_id)
    }

    /// Removes one terminal job from the registry.
    pub async fn clear(&self, id: JobId) -> Result<(), EngineError> {
        {
            let mut jobs = self.shared.jobs.write().await;
            let job = jobs.get(&id).ok_or(EngineError::JobNotFound(id))?;
            if !job.state.is_terminal() {
                return Err(EngineError::StillRunning(id));
            }
            jobs.remove(&id);
        }
        self.shared.tokens.write().await.remove(&id);
        Ok(())
    }

    /// Removes all terminal jobs from the registry. Returns how many
    /// were removed.
    pub async fn clear_finished(&self) -> usize {
        let removed: Vec<JobId> = {
            let mut jobs = self.shared.jobs.write().await;
            let ids: Vec<JobId> = jobs
                .iter()
                .filter(|(_, job)| job.state.is_terminal())
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                jobs.remove(id);
            }
            ids
        };

        let mut tokens = self.shared.tokens.write().await;
        for id in &removed {
            tokens.remove(id);
        }
        removed.len()
    }

    /// Returns a snapshot of one job.
    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.shared.jobs.read().await.get(&id).map(Job::snapshot)
    }

    /// Returns snapshots of all known jobs in submission order.
    pub async fn snapshots(&self) -> Vec<JobSnapshot> {
        let jobs = self.shared.jobs.read().await;
        let mut snapshots: Vec<JobSnapshot> = jobs.values().map(Job::snapshot).collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Subscribes to job snapshot updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.shared.events.subscribe()
    }

    /// Returns current aggregate counters.
    pub fn status(&self) -> EngineStatus {
        let stats = &self.shared.stats;
        EngineStatus {
            queued: stats.queued.load(Ordering::Relaxed) as usize,
            active: stats.active.load(Ordering::Relaxed) as usize,
            max_concurrent: self.shared.config.max_concurrent_tasks,
            completed: stats.completed.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            cancelled: stats.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Rejects new submissions and cancels every job still in flight.
    pub fn shutdown(&self) {
        info!("engine shutdown requested");
        self.shared.shutdown.cancel();
        self.shared.semaphore.close();
    }

    async fn enqueue(&self, job: Job) {
        let id = job.id;
        let token = self.shared.shutdown.child_token();

        self.shared.jobs.write().await.insert(id, job);
        self.shared.tokens.write().await.insert(id, token.clone());
        self.shared.stats.queued.fetch_add(1, Ordering::Relaxed);
        self.shared.broadcast(id).await;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.run_job(id, token).await;
        });
    }
}

impl<F: Fetcher + 'static, C: Converter + 'static> Shared<F, C> {
    fn updater(&self) -> JobUpdater {
        JobUpdater {
            jobs: Arc::clone(&self.jobs),
            events: self.events.clone(),
        }
    }

    /// Drives one job from the queue to a terminal state.
    async fn run_job(self: Arc<Self>, id: JobId, token: CancellationToken) {
        let permit = tokio::select! {
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };

        let Some(_permit) = permit else {
            // Cancelled (or engine closed) while still queued: no backend
            // was ever invoked for this job.
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            self.finish(id, JobState::Cancelled, None).await;
            return;
        };

        self.stats.queued.fetch_sub(1, Ordering::Relaxed);
        self.stats.active.fetch_add(1, Ordering::Relaxed);

        let result = self.run_stages(id, &token).await;

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        match result {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                self.finish(id, JobState::Completed, None).await;
            }
            Err(error) if error.is_cancellation() || token.is_cancelled() => {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                self.cleanup_artifacts(id, true).await;
                self.finish(id, JobState::Cancelled, None).await;
            }
            Err(error) => {
                warn!(job_id = %id, error = %error, "job failed");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.cleanup_artifacts(id, false).await;
                self.finish(id, JobState::Failed, Some(JobErrorInfo::from(&error)))
                    .await;
            }
        }
    }

    /// Runs the fetch and sanitize stages. Terminal bookkeeping is the
    /// caller's responsibility.
    async fn run_stages(&self, id: JobId, token: &CancellationToken) -> Result<(), JobError> {
        let reference = {
            let jobs = self.jobs.read().await;
            match jobs.get(&id) {
                Some(job) => job.reference.clone(),
                None => return Ok(()), // cleared under our feet, nothing to do
            }
        };

        // Stage 1: fetch the raw artifact.
        self.transition(id, JobState::Downloading).await;

        let (fetch_tx, fetch_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let consumer = tokio::spawn(self.updater().consume_fetch_events(id, fetch_rx));

        let fetch_result = self
            .fetcher
            .fetch(
                FetchJob::new(id, reference, self.config.download_dir.clone()),
                fetch_tx,
                token.child_token(),
            )
            .await;
        let mut download = match consumer.await {
            Ok(aggregator) => aggregator,
            Err(_) => ProgressAggregator::new(Phase::Download),
        };
        let output = fetch_result?;

        let raw_bytes = tokio::fs::metadata(&output.raw_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let title = output.title.clone();
        let raw_path = output.raw_path.clone();
        let download_snapshot = download.complete();
        self.updater()
            .apply(id, move |job| {
                job.title = Some(title);
                job.raw_path = Some(raw_path);
                job.download_progress = Some(download_snapshot);
            })
            .await;
        self.transition(id, JobState::Downloaded).await;
        debug!(job_id = %id, title = %output.title, raw_bytes, "fetch complete");

        if token.is_cancelled() {
            return Err(JobError::Fetch(FetchError::Cancelled));
        }

        // Reserve the final output name now that the title is known.
        let output_path = self.resolver.resolve(&output.title, id)?;

        // Stage 2: sanitize into an intermediate file, then rename into
        // the output directory so a partial encode never lands there.
        let intermediate = self.intermediate_path(id);
        let final_path = output_path.clone();
        self.updater()
            .apply(id, move |job| job.output_path = Some(final_path))
            .await;
        self.transition(id, JobState::Sanitizing).await;

        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let consumer = tokio::spawn(self.updater().consume_transcode_progress(
            id,
            raw_bytes,
            progress_rx,
        ));

        let transcode_result = self
            .converter
            .transcode(
                TranscodeJob {
                    job_id: id,
                    input_path: output.raw_path.clone(),
                    output_path: intermediate.clone(),
                },
                progress_tx,
                token.child_token(),
            )
            .await;
        let mut sanitize = match consumer.await {
            Ok(aggregator) => aggregator,
            Err(_) => ProgressAggregator::new(Phase::Sanitize),
        };
        let result = transcode_result?;

        tokio::fs::rename(&intermediate, &output_path)
            .await
            .map_err(|e| JobError::Transcode(TranscodeError::Io(e)))?;

        let stats = CompletionStats::compute(raw_bytes, result.output_size_bytes);
        sanitize.set_sizes(Some(stats.raw_bytes), Some(stats.clean_bytes));
        let sanitize_snapshot = sanitize.complete();
        self.updater()
            .apply(id, move |job| {
                job.stats = Some(stats);
                job.sanitize_progress = Some(sanitize_snapshot);
            })
            .await;

        // The raw artifact has served its purpose.
        if let Err(e) = tokio::fs::remove_file(&output.raw_path).await {
            warn!(job_id = %id, error = %e, "failed to remove raw artifact");
        }

        info!(
            job_id = %id,
            output = %output_path.display(),
            reduction = stats.reduction_percent,
            "job complete"
        );
        Ok(())
    }

    /// Removes on-disk leftovers of a job that did not complete. The
    /// reserved output name stays retired either way.
    async fn cleanup_artifacts(&self, id: JobId, remove_raw: bool) {
        let intermediate = self.intermediate_path(id);
        if tokio::fs::remove_file(&intermediate).await.is_ok() {
            debug!(job_id = %id, "removed partial intermediate file");
        }

        let raw_path = self
            .jobs
            .read()
            .await
            .get(&id)
            .and_then(|j| j.raw_path.clone());
        match raw_path {
            Some(raw_path) if remove_raw => {
                if tokio::fs::remove_file(&raw_path).await.is_ok() {
                    debug!(job_id = %id, "removed raw artifact");
                }
            }
            Some(_) => {}
            // The fetch never finished; whatever the backend wrote
            // under this job's file tag is partial.
            None => self.sweep_partial_downloads(id).await,
        }
    }

    /// Removes half-written download files, identified by the job's
    /// file tag in their name.
    async fn sweep_partial_downloads(&self, id: JobId) {
        let tag = format!("_job{}.", id);
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.download_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy().contains(&tag)
                && tokio::fs::remove_file(entry.path()).await.is_ok()
            {
                debug!(job_id = %id, file = %name.to_string_lossy(), "removed partial download");
            }
        }
    }

    fn intermediate_path(&self, id: JobId) -> PathBuf {
        self.config.download_dir.join(format!("job{}.clean.mp4", id))
    }

    async fn transition(&self, id: JobId, next: JobState) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if let Err(e) = job.transition(next) {
                warn!(job_id = %id, error = %e, "rejected state transition");
                return;
            }
            let snapshot = job.snapshot();
            drop(jobs);
            let _ = self.events.send(snapshot);
        }
    }

    /// Moves the job to its terminal state and drops its cancel token.
    async fn finish(&self, id: JobId, state: JobState, error: Option<JobErrorInfo>) {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(&id) {
                job.error = error;
                if let Err(e) = job.transition(state) {
                    warn!(job_id = %id, error = %e, "rejected terminal transition");
                }
            }
        }
        self.tokens.write().await.remove(&id);
        self.broadcast(id).await;
    }

    async fn broadcast(&self, id: JobId) {
        let snapshot = self.jobs.read().await.get(&id).map(Job::snapshot);
        if let Some(snapshot) = snapshot {
            let _ = self.events.send(snapshot);
        }
    }
}
