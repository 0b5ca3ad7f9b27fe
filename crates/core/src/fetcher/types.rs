//! Types for the fetcher module.

use std::path::PathBuf;

use crate::job::JobId;
use crate::progress::RawProgress;

/// A request to fetch one reference into a destination directory.
#[derive(Debug, Clone)]
pub struct FetchJob {
    /// Job this fetch belongs to.
    pub job_id: JobId,
    /// Source reference (URL).
    pub reference: String,
    /// Directory to place the raw artifact in.
    pub dest_dir: PathBuf,
    /// Tag appended to the raw file name so repeated fetches of the same
    /// title never collide inside the destination directory.
    pub file_tag: String,
}

impl FetchJob {
    pub fn new(job_id: JobId, reference: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            reference: reference.into(),
            dest_dir: dest_dir.into(),
            file_tag: format!("job{}", job_id),
        }
    }
}

/// Successful fetch outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutput {
    /// Path to the raw artifact on the local filesystem.
    pub raw_path: PathBuf,
    /// Title derived from the backend's reported destination name.
    pub title: String,
}

/// An event emitted by the fetch backend while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Transfer progress. Fields the backend did not report are `None`.
    Progress(RawProgress),
    /// The backend announced the media title.
    Title(String),
    /// A human-readable status note ("merging", "waiting", ...).
    Status(String),
}
