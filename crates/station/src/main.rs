mod console;
mod display;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cleanstream_core::{
    load_config, validate_config, Converter, EngineConfig, Fetcher, FfmpegConverter,
    FilenameResolver, JobEngine, JobSnapshot, JobState, YtDlpFetcher,
};

use console::{parse_command, Command, USAGE};
use display::{format_job_line, format_status};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extension of every sanitized output file.
const OUTPUT_EXTENSION: &str = "mp4";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("STATION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("CleanStream Station v{}", VERSION);
    info!("Download dir: {:?}", config.station.download_dir);
    info!("Output dir: {:?}", config.station.output_dir);
    info!("Concurrency limit: {}", config.station.max_concurrent_tasks);

    tokio::fs::create_dir_all(&config.station.download_dir)
        .await
        .context("Failed to create download directory")?;
    tokio::fs::create_dir_all(&config.station.output_dir)
        .await
        .context("Failed to create output directory")?;

    // The station-level cancel grace applies to both backends.
    let mut fetcher_config = config.fetcher.clone();
    fetcher_config.kill_grace_secs = config.station.cancel_grace_secs;
    let mut converter_config = config.converter.clone();
    converter_config.kill_grace_secs = config.station.cancel_grace_secs;

    let fetcher = YtDlpFetcher::new(fetcher_config);
    fetcher
        .validate()
        .await
        .context("Fetch backend is not usable")?;

    let converter = FfmpegConverter::new(converter_config);
    converter
        .validate()
        .await
        .context("Transcode backend is not usable")?;

    let resolver = Arc::new(FilenameResolver::new(
        config.station.output_dir.clone(),
        OUTPUT_EXTENSION,
    ));
    let seeded = resolver
        .seed_from_dir()
        .context("Failed to scan output directory")?;
    info!("Recorded {} existing output names", seeded);

    let engine = JobEngine::new(
        EngineConfig::from(&config.station),
        fetcher,
        converter,
        resolver,
    );

    // Announce state changes as they happen.
    let watcher = tokio::spawn(watch_jobs(engine.subscribe()));

    println!("CleanStream Station v{} ready, type 'help' for commands", VERSION);
    run_console(&engine).await;

    // Shut down: cancel in-flight jobs and give them the grace period
    // to wind down.
    engine.shutdown();
    let grace = Duration::from_secs(config.station.cancel_grace_secs);
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let status = engine.status();
        if status.active == 0 && status.queued == 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                active = status.active,
                queued = status.queued,
                "grace period elapsed with jobs still winding down"
            );
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    watcher.abort();
    info!("Station stopped");
    Ok(())
}

/// Reads console commands from stdin until quit, EOF or a signal.
async fn run_console(engine: &JobEngine<YtDlpFetcher, FfmpegConverter>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    break;
                }
            },
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match command {
            Command::Add(reference) => match engine.submit(reference).await {
                Ok(id) => println!("queued job {}", id),
                Err(e) => println!("error: {}", e),
            },
            Command::Cancel(id) => match engine.cancel(id).await {
                Ok(()) => println!("cancelling job {}", id),
                Err(e) => println!("error: {}", e),
            },
            Command::Retry(id) => match engine.retry(id).await {
                Ok(new_id) => println!("queued job {} (retry of {})", new_id, id),
                Err(e) => println!("error: {}", e),
            },
            Command::Jobs => {
                let snapshots = engine.snapshots().await;
                if snapshots.is_empty() {
                    println!("no jobs");
                }
                for snapshot in snapshots {
                    println!("{}", format_job_line(&snapshot));
                }
            }
            Command::Dump => {
                let snapshots = engine.snapshots().await;
                match serde_json::to_string_pretty(&snapshots) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("error: {}", e),
                }
            }
            Command::Status => println!("{}", format_status(&engine.status())),
            Command::Clear(Some(id)) => match engine.clear(id).await {
                Ok(()) => println!("removed job {}", id),
                Err(e) => println!("error: {}", e),
            },
            Command::Clear(None) => {
                println!("removed {} finished jobs", engine.clear_finished().await)
            }
            Command::Help => println!("{}", USAGE),
            Command::Quit => break,
        }
    }
}

/// Prints a line whenever a job changes state.
async fn watch_jobs(mut events: broadcast::Receiver<JobSnapshot>) {
    let mut last_states: HashMap<_, JobState> = HashMap::new();
    loop {
        match events.recv().await {
            Ok(snapshot) => {
                if last_states.get(&snapshot.id) != Some(&snapshot.state) {
                    last_states.insert(snapshot.id, snapshot.state);
                    println!("{}", format_job_line(&snapshot));
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "job event watcher lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
