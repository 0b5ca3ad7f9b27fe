//! Job data model.
//!
//! A job tracks one media reference through the two-stage pipeline:
//! fetch the raw artifact, then sanitize it into the clean output
//! directory. State transitions are enforced here; the engine drives
//! them.

mod types;

pub use types::{
    CompletionStats, Job, JobError, JobErrorInfo, JobId, JobSnapshot, JobState, TransitionError,
};
