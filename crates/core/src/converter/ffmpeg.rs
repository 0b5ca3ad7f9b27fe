//! FFmpeg based converter implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::TranscodeError;
use super::traits::Converter;
use super::types::{MediaInfo, TranscodeJob, TranscodeProgress, TranscodeResult};

/// Fixed sanitize profile: constant-quality H.264, standard AAC audio,
/// metadata and chapter streams stripped, first video/audio streams only.
const VIDEO_CODEC: &str = "libx264";
const VIDEO_PRESET: &str = "medium";
const VIDEO_CRF: &str = "23";
const AUDIO_CODEC: &str = "aac";

/// FFmpeg based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds the ffmpeg argument list for the fixed sanitize profile.
    fn build_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "0:a:0?".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-map_chapters".to_string(),
            "-1".to_string(),
            "-c:v".to_string(),
            VIDEO_CODEC.to_string(),
            "-preset".to_string(),
            VIDEO_PRESET.to_string(),
            "-crf".to_string(),
            VIDEO_CRF.to_string(),
            "-c:a".to_string(),
            AUDIO_CODEC.to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, TranscodeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
            size: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| TranscodeError::ProbeFailed {
                reason: format!("failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
        })
    }

    async fn run_transcode(
        &self,
        job: &TranscodeJob,
        progress_tx: &mpsc::Sender<TranscodeProgress>,
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError> {
        let start = Instant::now();

        // Input duration drives percent/eta computation; a failed probe
        // degrades progress to unknown rather than failing the job.
        let duration_secs = self
            .probe(&job.input_path)
            .await
            .ok()
            .map(|i| i.duration_secs)
            .filter(|d| *d > 0.0);

        let args = self.build_args(&job.input_path, &job.output_path);
        debug!(job_id = %job.job_id, ?args, "spawning ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        let stderr = child.stderr.take().expect("stderr should be captured");
        let mut reader = BufReader::new(stderr).lines();

        let mut tracker = ProgressTracker::new(job.job_id, duration_secs);
        let mut error_output = String::new();
        let mut last_send = Instant::now();
        let send_interval = Duration::from_millis(500);

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let read_result = timeout(timeout_duration, async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok::<bool, std::io::Error>(true),
                    line = reader.next_line() => match line? {
                        Some(line) => {
                            if tracker.consume(&line) {
                                if last_send.elapsed() >= send_interval {
                                    let _ = progress_tx.try_send(tracker.progress(start));
                                    last_send = Instant::now();
                                }
                            } else if !line.trim().is_empty() && !line.contains('=') {
                                error_output.push_str(&line);
                                error_output.push('\n');
                            }
                        }
                        None => return Ok(false),
                    },
                }
            }
        })
        .await;

        let cancelled = match read_result {
            Ok(Ok(cancelled)) => cancelled,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(TranscodeError::Io(e));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(TranscodeError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        if cancelled {
            let _ = child.start_kill();
            let grace = Duration::from_secs(self.config.kill_grace_secs);
            if timeout(grace, child.wait()).await.is_err() {
                warn!(job_id = %job.job_id, "ffmpeg did not exit within grace period");
            }
            return Err(TranscodeError::Cancelled);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(TranscodeError::classify(&error_output));
        }

        let output_meta = tokio::fs::metadata(&job.output_path)
            .await
            .map_err(|_| TranscodeError::Unknown {
                message: "output file not created".to_string(),
            })?;

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscodeError> {
        if !path.exists() {
            return Err(TranscodeError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscodeError::ProbeFailed {
                reason: format!(
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: mpsc::Sender<TranscodeProgress>,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError> {
        self.run_transcode(&job, &progress, &cancel).await
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        for (path, not_found) in [
            (
                &self.config.ffmpeg_path,
                TranscodeError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                },
            ),
            (
                &self.config.ffprobe_path,
                TranscodeError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                },
            ),
        ] {
            if let Err(e) = Command::new(path).arg("-version").output().await {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(not_found);
                }
                return Err(TranscodeError::Io(e));
            }
        }
        Ok(())
    }
}

/// Accumulates `-progress pipe:2` key-value lines into progress updates.
struct ProgressTracker {
    job_id: crate::job::JobId,
    duration_secs: Option<f64>,
    out_time_secs: f64,
    fps: Option<f32>,
    speed: Option<f32>,
}

impl ProgressTracker {
    fn new(job_id: crate::job::JobId, duration_secs: Option<f64>) -> Self {
        Self {
            job_id,
            duration_secs,
            out_time_secs: 0.0,
            fps: None,
            speed: None,
        }
    }

    /// Consumes one stderr line. Returns true if it was a progress
    /// key-value line.
    fn consume(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        match key {
            "out_time_ms" | "out_time_us" => {
                // Despite the name, ffmpeg reports microseconds here.
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
                true
            }
            "fps" => {
                self.fps = value.parse::<f32>().ok().filter(|f| *f > 0.0);
                true
            }
            "speed" => {
                self.speed = value
                    .trim_end_matches('x')
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|s| *s > 0.0);
                true
            }
            "progress" | "frame" | "bitrate" | "total_size" | "out_time" | "drop_frames"
            | "dup_frames" | "stream_0_0_q" => true,
            _ => false,
        }
    }

    /// Builds a progress update from the current accumulated state.
    fn progress(&self, start: Instant) -> TranscodeProgress {
        let percent = self.duration_secs.map(|duration| {
            // Hold just under 100 until the process actually exits.
            ((self.out_time_secs / duration) * 100.0).min(99.9) as f32
        });

        let eta_secs = percent.filter(|p| *p > 0.0).map(|p| {
            let elapsed = start.elapsed().as_secs_f64();
            let total = elapsed * (100.0 / p as f64);
            (total - elapsed).max(0.0) as u64
        });

        TranscodeProgress {
            job_id: self.job_id,
            percent,
            out_time_secs: self.out_time_secs,
            fps: self.fps,
            speed: self.speed,
            eta_secs,
        }
    }
}
