//! Metrics collection for map execution.
//!
//! Counters are updated lock-free by workers through [`MetricsRecorder`] and
//! read back as a plain [`MapMetrics`] snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of map execution counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMetrics {
    /// Number of map calls started with this context.
    pub runs: usize,
    /// Number of transform invocations across all calls.
    pub invocations: usize,
    /// Invocations that returned a value.
    pub succeeded: usize,
    /// Invocations that returned an error or panicked.
    pub failed: usize,
    /// Jobs pulled by a worker but dropped because the call was already stopping.
    pub skipped: usize,
}

impl MapMetrics {
    /// Check if any invocation failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    runs: AtomicUsize,
    invocations: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl MetricsRecorder {
    pub(crate) fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MapMetrics {
        MapMetrics {
            runs: self.runs.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
