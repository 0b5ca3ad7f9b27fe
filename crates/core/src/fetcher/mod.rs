//! Fetch backend for retrieving raw media from a reference.
//!
//! This module provides the `Fetcher` trait and the yt-dlp based
//! implementation. The fetcher is an external collaborator: given a
//! reference and a destination directory it produces a local raw artifact
//! and streams progress events while it runs. It performs no media parsing
//! of its own.

mod config;
mod error;
mod traits;
mod types;
mod ytdlp;

pub use config::FetcherConfig;
pub use error::FetchError;
pub use traits::Fetcher;
pub use types::{FetchEvent, FetchJob, FetchOutput};
pub use ytdlp::YtDlpFetcher;
