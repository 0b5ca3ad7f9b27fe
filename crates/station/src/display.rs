//! Console rendering of job snapshots.

use cleanstream_core::{EngineStatus, JobSnapshot, JobState, ProgressSnapshot};

/// Renders one job as a single console line.
pub fn format_job_line(snapshot: &JobSnapshot) -> String {
    let mut line = format!(
        "[{}] {:<11} {}",
        snapshot.id,
        snapshot.state.as_str(),
        snapshot.display_title()
    );

    match snapshot.state {
        JobState::Downloading => {
            if let Some(progress) = &snapshot.download_progress {
                line.push_str(&format!("  {}", format_progress(progress)));
            }
        }
        JobState::Sanitizing => {
            if let Some(progress) = &snapshot.sanitize_progress {
                line.push_str(&format!("  {}", format_progress(progress)));
            }
        }
        JobState::Completed => {
            if let Some(stats) = &snapshot.stats {
                line.push_str(&format!(
                    "  {} -> {} ({:+.1}%)",
                    format_bytes(stats.raw_bytes),
                    format_bytes(stats.clean_bytes),
                    -stats.reduction_percent,
                ));
            }
        }
        JobState::Failed => {
            if let Some(error) = &snapshot.error {
                line.push_str(&format!("  {}: {}", error.kind, error.message));
            }
        }
        _ => {}
    }

    if snapshot.attempt > 1 {
        line.push_str(&format!("  (attempt {})", snapshot.attempt));
    }
    line
}

fn format_progress(progress: &ProgressSnapshot) -> String {
    let mut parts = vec![format!("{:.1}%", progress.percent)];
    if let Some(rate) = &progress.rate {
        parts.push(rate.to_string());
    }
    if let Some(eta) = progress.eta_secs {
        parts.push(format!("ETA {}", format_eta(eta)));
    }
    parts.join(" ")
}

fn format_eta(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// Renders the engine counters.
pub fn format_status(status: &EngineStatus) -> String {
    format!(
        "active {}/{}  queued {}  completed {}  failed {}  cancelled {}",
        status.active,
        status.max_concurrent,
        status.queued,
        status.completed,
        status.failed,
        status.cancelled,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanstream_core::{CompletionStats, JobErrorInfo, JobId, Phase, Rate};
    use chrono::Utc;

    fn snapshot(state: JobState) -> JobSnapshot {
        JobSnapshot {
            id: JobId::new(3),
            reference: "https://example.com/v/1".to_string(),
            state,
            title: Some("My Video".to_string()),
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

    #[test]
    fn test_downloading_line_includes_progress() {
        let mut s = snapshot(JobState::Downloading);
        s.download_progress = Some(ProgressSnapshot {
            phase: Phase::Download,
            percent: 45.5,
            rate: Some(Rate::BytesPerSec(2.0 * 1024.0 * 1024.0)),
            eta_secs: Some(95),
            size_before: None,
            size_after: None,
        });
        let line = format_job_line(&s);
        assert!(line.contains("[3] downloading"));
        assert!(line.contains("My Video"));
        assert!(line.contains("45.5%"));
        assert!(line.contains("ETA 1m35s"));
    }

    #[test]
    fn test_completed_line_includes_size_change() {
        let mut s = snapshot(JobState::Completed);
        s.stats = Some(CompletionStats::compute(1_048_576, 524_288));
        let line = format_job_line(&s);
        assert!(line.contains("1.0MiB"));
        assert!(line.contains("512.0KiB"));
        assert!(line.contains("-50.0%"));
    }

    #[test]
    fn test_failed_line_includes_error_kind() {
        let mut s = snapshot(JobState::Failed);
        s.error = Some(JobErrorInfo {
            kind: "fetch/network".to_string(),
            message: "connection refused".to_string(),
        });
        let line = format_job_line(&s);
        assert!(line.contains("fetch/network"));
        assert!(line.contains("connection refused"));
    }

    #[test]
    fn test_queued_line_falls_back_to_reference() {
        let mut s = snapshot(JobState::Queued);
        s.title = None;
        let line = format_job_line(&s);
        assert!(line.contains("https://example.com/v/1"));
    }

    #[test]
    fn test_retry_attempt_is_annotated() {
        let mut s = snapshot(JobState::Queued);
        s.attempt = 2;
        assert!(format_job_line(&s).contains("(attempt 2)"));
    }

    #[test]
    fn test_eta_formatting() {
        assert_eq!(format_eta(42), "42s");
        assert_eq!(format_eta(95), "1m35s");
        assert_eq!(format_eta(3725), "1h02m");
    }
}
