//! yt-dlp based fetcher implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::FetcherConfig;
use super::error::FetchError;
use super::traits::Fetcher;
use super::types::{FetchEvent, FetchJob, FetchOutput};
use crate::progress::{Rate, RawProgress};

/// yt-dlp based fetcher implementation.
pub struct YtDlpFetcher {
    config: FetcherConfig,
}

impl YtDlpFetcher {
    /// Creates a new fetcher with the given configuration.
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// Creates a fetcher with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FetcherConfig::default())
    }

    /// Builds the yt-dlp argument list for a job.
    fn build_args(&self, job: &FetchJob) -> Vec<String> {
        let template = job
            .dest_dir
            .join(format!("%(title)s_{}.%(ext)s", job.file_tag));

        let mut args = vec![
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(job.reference.clone());
        args
    }

    async fn run_fetch(
        &self,
        job: &FetchJob,
        events: &mpsc::Sender<FetchEvent>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        let args = self.build_args(job);
        debug!(job_id = %job.job_id, ?args, "spawning yt-dlp");

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::BinaryNotFound {
                        path: self.config.binary_path.clone(),
                    }
                } else {
                    FetchError::Io(e)
                }
            })?;

        let stdout = child.stdout.take().expect("stdout should be captured");
        let stderr = child.stderr.take().expect("stderr should be captured");

        // Collect stderr separately; it is only consulted on failure.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
                if collected.len() > 16 * 1024 {
                    collected.drain(..collected.len() / 2);
                }
            }
            collected
        });

        let parser = LineParser::new();
        let mut detected_path: Option<PathBuf> = None;
        let mut reader = BufReader::new(stdout).lines();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let read_result = timeout(timeout_duration, async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok::<bool, std::io::Error>(true),
                    line = reader.next_line() => match line? {
                        Some(line) => {
                            match parser.parse(&line) {
                                Some(ParsedLine::Progress(raw)) => {
                                    let _ = events.try_send(FetchEvent::Progress(raw));
                                }
                                Some(ParsedLine::Destination(path)) => {
                                    let title = parser.title_from_path(&path, &job.file_tag);
                                    if !title.is_empty() {
                                        let _ = events.try_send(FetchEvent::Title(title));
                                    }
                                    detected_path = Some(path);
                                }
                                Some(ParsedLine::Status(status)) => {
                                    let _ = events.try_send(FetchEvent::Status(status));
                                }
                                None => {}
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
                return Err(FetchError::Io(e));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(FetchError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        if cancelled {
            let _ = child.start_kill();
            let grace = Duration::from_secs(self.config.kill_grace_secs);
            if timeout(grace, child.wait()).await.is_err() {
                warn!(job_id = %job.job_id, "yt-dlp did not exit within grace period");
            }
            return Err(FetchError::Cancelled);
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(FetchError::classify(&stderr_output));
        }

        let raw_path = detected_path.ok_or(FetchError::MissingOutput)?;
        if tokio::fs::metadata(&raw_path).await.is_err() {
            return Err(FetchError::MissingOutput);
        }

        let title = parser.title_from_path(&raw_path, &job.file_tag);
        Ok(FetchOutput { raw_path, title })
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(
        &self,
        job: FetchJob,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<FetchOutput, FetchError> {
        self.run_fetch(&job, &events, &cancel).await
    }

    async fn validate(&self) -> Result<(), FetchError> {
        let result = Command::new(&self.config.binary_path)
            .arg("--version")
            .output()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::BinaryNotFound {
                    path: self.config.binary_path.clone(),
                })
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

/// A parsed line of yt-dlp output.
#[derive(Debug, Clone, PartialEq)]
enum ParsedLine {
    Progress(RawProgress),
    Destination(PathBuf),
    Status(String),
}

/// Recognizes the yt-dlp output lines the pipeline cares about.
struct LineParser {
    progress_re: Regex,
    percent_re: Regex,
    dest_re: Regex,
    merge_re: Regex,
    exists_re: Regex,
    format_id_re: Regex,
    bracket_re: Regex,
}

impl LineParser {
    fn new() -> Self {
        Self {
            progress_re: Regex::new(r#"\[download\]\s+(\d+\.?\d*)%.*at\s+(\S+)\s+ETA\s+(\S+)"#)
                .expect("progress regex"),
            percent_re: Regex::new(r"(\d+\.?\d*)%").expect("percent regex"),
            dest_re: Regex::new(r"\[download\] Destination: (.+)").expect("destination regex"),
            merge_re: Regex::new(r#"\[Merger\] Merging formats into "(.+)""#)
                .expect("merger regex"),
            exists_re: Regex::new(r"\[download\] (.+) has already been downloaded")
                .expect("exists regex"),
            format_id_re: Regex::new(r"\.f\d+$").expect("format id regex"),
            bracket_re: Regex::new(r"\s*\[[^\]]*\]$").expect("bracket regex"),
        }
    }

    fn parse(&self, line: &str) -> Option<ParsedLine> {
        let line = line.trim();

        if let Some(caps) = self.dest_re.captures(line) {
            return Some(ParsedLine::Destination(PathBuf::from(caps[1].trim())));
        }
        if let Some(caps) = self.merge_re.captures(line) {
            return Some(ParsedLine::Destination(PathBuf::from(caps[1].trim())));
        }
        if let Some(caps) = self.exists_re.captures(line) {
            return Some(ParsedLine::Destination(PathBuf::from(caps[1].trim())));
        }

        if let Some(caps) = self.progress_re.captures(line) {
            let percent = caps[1].parse::<f32>().ok();
            return Some(ParsedLine::Progress(RawProgress {
                percent,
                rate: parse_rate(&caps[2]),
                eta_secs: parse_eta(&caps[3]),
            }));
        }

        // Percent-only lines (e.g. fragment progress without rate/ETA).
        if line.contains("[download]") {
            if let Some(caps) = self.percent_re.captures(line) {
                let percent = caps[1].parse::<f32>().ok();
                return Some(ParsedLine::Progress(RawProgress {
                    percent,
                    rate: None,
                    eta_secs: None,
                }));
            }
        }

        if line.contains("[Merger]") {
            return Some(ParsedLine::Status("merging".to_string()));
        }
        if line.contains("Sleeping") {
            return Some(ParsedLine::Status("waiting".to_string()));
        }

        None
    }

    /// Derives a display title from a backend-reported destination path.
    ///
    /// Strips the intermediate stream suffix (`.f137`), the job file
    /// tag, and any trailing bracketed id left by templates.
    fn title_from_path(&self, path: &Path, file_tag: &str) -> String {
        let mut stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(m) = self.format_id_re.find(&stem) {
            stem.truncate(m.start());
        }

        let tag_suffix = format!("_{}", file_tag);
        if let Some(stripped) = stem.strip_suffix(&tag_suffix) {
            stem = stripped.to_string();
        }

        if let Some(m) = self.bracket_re.find(&stem) {
            stem.truncate(m.start());
        }

        stem.trim().to_string()
    }
}

/// Parses a yt-dlp rate token such as `3.42MiB/s` into bytes per second.
fn parse_rate(token: &str) -> Option<Rate> {
    let token = token.strip_suffix("/s")?;
    let split = token.find(|c: char| c.is_alphabetic())?;
    let (number, unit) = token.split_at(split);
    let value = number.parse::<f64>().ok()?;

    let multiplier = match unit {
        "B" => 1.0,
        "KiB" | "KB" => 1024.0,
        "MiB" | "MB" => 1024.0 * 1024.0,
        "GiB" | "GB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" | "TB" => 1024.0_f64.powi(4),
        _ => return None,
    };
    Some(Rate::BytesPerSec(value * multiplier))
}

/// Parses a yt-dlp ETA token (`SS`, `MM:SS` or `HH:MM:SS`) into seconds.
fn parse_eta(token: &str) -> Option<u64> {
    let mut secs: u64 = 0;
    for part in token.split(':') {
        secs = secs.checked_mul(60)?.checked_add(part.parse::<u64>().ok()?)?;
    }
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    #[test]
    fn test_build_args() {
        let fetcher = YtDlpFetcher::with_defaults();
        let job = FetchJob::new(JobId::new(3), "https://example.com/watch?v=abc", "/raw");
        let args = fetcher.build_args(&job);

        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"-f".to_string()));
        assert!(args.iter().any(|a| a.contains("%(title)s_job3.%(ext)s")));
        assert_eq!(args.last().unwrap(), "https://example.com/watch?v=abc");
    }

    #[test]
    fn test_parse_progress_line() {
        let parser = LineParser::new();
        let parsed = parser
            .parse("[download]  45.2% of 120.53MiB at 3.42MiB/s ETA 00:25")
            .unwrap();

        match parsed {
            ParsedLine::Progress(raw) => {
                assert_eq!(raw.percent, Some(45.2));
                assert_eq!(raw.eta_secs, Some(25));
                match raw.rate {
                    Some(Rate::BytesPerSec(b)) => {
                        assert!((b - 3.42 * 1024.0 * 1024.0).abs() < 1.0)
                    }
                    other => panic!("unexpected rate: {:?}", other),
                }
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_percent_only_line() {
        let parser = LineParser::new();
        let parsed = parser.parse("[download]  12.0%").unwrap();
        assert_eq!(
            parsed,
            ParsedLine::Progress(RawProgress {
                percent: Some(12.0),
                rate: None,
                eta_secs: None,
            })
        );
    }

    #[test]
    fn test_parse_destination_line() {
        let parser = LineParser::new();
        let parsed = parser
            .parse("[download] Destination: /raw/Some Video_job1.f137.mp4")
            .unwrap();
        assert_eq!(
            parsed,
            ParsedLine::Destination(PathBuf::from("/raw/Some Video_job1.f137.mp4"))
        );
    }

    #[test]
    fn test_parse_merger_line() {
        let parser = LineParser::new();
        let parsed = parser
            .parse(r#"[Merger] Merging formats into "/raw/Some Video_job1.mp4""#)
            .unwrap();
        assert_eq!(
            parsed,
            ParsedLine::Destination(PathBuf::from("/raw/Some Video_job1.mp4"))
        );
    }

    #[test]
    fn test_parse_already_downloaded_line() {
        let parser = LineParser::new();
        let parsed = parser
            .parse("[download] /raw/Some Video_job1.mp4 has already been downloaded")
            .unwrap();
        assert_eq!(
            parsed,
            ParsedLine::Destination(PathBuf::from("/raw/Some Video_job1.mp4"))
        );
    }

    #[test]
    fn test_parse_ignores_noise() {
        let parser = LineParser::new();
        assert!(parser.parse("[info] Downloading 1 format(s): 137+140").is_none());
        assert!(parser.parse("").is_none());
    }

    #[test]
    fn test_parse_eta_formats() {
        assert_eq!(parse_eta("25"), Some(25));
        assert_eq!(parse_eta("01:05"), Some(65));
        assert_eq!(parse_eta("1:00:05"), Some(3605));
        assert_eq!(parse_eta("Unknown"), None);
    }

    #[test]
    fn test_parse_rate_units() {
        assert_eq!(parse_rate("512B/s"), Some(Rate::BytesPerSec(512.0)));
        assert_eq!(parse_rate("2KiB/s"), Some(Rate::BytesPerSec(2048.0)));
        assert_eq!(parse_rate("Unknown"), None);
    }

    #[test]
    fn test_title_from_path_strips_tag_and_format_id() {
        let parser = LineParser::new();
        let title = parser.title_from_path(Path::new("/raw/日本語タイトル_job4.f137.mp4"), "job4");
        assert_eq!(title, "日本語タイトル");
    }

    #[test]
    fn test_title_from_path_strips_trailing_bracket_tag() {
        let parser = LineParser::new();
        let title = parser.title_from_path(Path::new("/raw/Some Video [abc123]_job2.mp4"), "job2");
        assert_eq!(title, "Some Video");
    }

    #[test]
    fn test_title_from_path_plain() {
        let parser = LineParser::new();
        let title = parser.title_from_path(Path::new("/raw/Plain Title_job9.mp4"), "job9");
        assert_eq!(title, "Plain Title");
    }
}
