//! Engine status types.

use serde::{Deserialize, Serialize};

/// Aggregate counters for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Jobs waiting for a concurrency slot.
    pub queued: usize,
    /// Jobs currently holding a slot.
    pub active: usize,
    /// Slot limit.
    pub max_concurrent: usize,
    /// Jobs that reached Completed.
    pub completed: u64,
    /// Jobs that reached Failed.
    pub failed: u64,
    /// Jobs that reached Cancelled.
    pub cancelled: u64,
}
