//! Progress aggregator implementation.

use super::types::{Phase, ProgressSnapshot, RawProgress};

/// Accumulates raw backend observations into a normalized snapshot.
///
/// One aggregator instance exists per job per phase. Percent values are
/// clamped to the last-seen maximum within the phase so duplicate or
/// out-of-order backend lines never make the displayed bar move backwards.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    snapshot: ProgressSnapshot,
}

impl ProgressAggregator {
    pub fn new(phase: Phase) -> Self {
        Self {
            snapshot: ProgressSnapshot::empty(phase),
        }
    }

    /// Folds a raw observation into the snapshot and returns the result.
    ///
    /// Missing fields leave the previous value in place; a regressing
    /// percent is ignored.
    pub fn observe(&mut self, raw: RawProgress) -> ProgressSnapshot {
        if let Some(percent) = raw.percent {
            let clamped = percent.clamp(0.0, 100.0);
            if clamped > self.snapshot.percent {
                self.snapshot.percent = clamped;
            }
        }
        if raw.rate.is_some() {
            self.snapshot.rate = raw.rate;
        }
        if raw.eta_secs.is_some() {
            self.snapshot.eta_secs = raw.eta_secs;
        }
        self.snapshot.clone()
    }

    /// Records artifact sizes once they are known.
    pub fn set_sizes(&mut self, before: Option<u64>, after: Option<u64>) {
        if before.is_some() {
            self.snapshot.size_before = before;
        }
        if after.is_some() {
            self.snapshot.size_after = after;
        }
    }

    /// Marks the phase finished: percent pinned to 100, ETA cleared.
    pub fn complete(&mut self) -> ProgressSnapshot {
        self.snapshot.percent = 100.0;
        self.snapshot.eta_secs = None;
        self.snapshot.clone()
    }

    /// The current snapshot without folding in a new observation.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.clone()
    }
}
