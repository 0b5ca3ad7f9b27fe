//! Job engine.
//!
//! Owns the job registry and drives each submission through the
//! fetch and sanitize stages under a bounded concurrency limit.
//! Submissions are admitted in FIFO order; cancellation is observed
//! at every stage boundary.

mod config;
mod runner;
mod types;

pub use config::EngineConfig;
pub use runner::{EngineError, JobEngine};
pub use types::EngineStatus;
