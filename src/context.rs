//! Execution context for map calls.
//!
//! An [`ExecutionContext`] bundles the caller's cancellation token with the
//! metrics and trace log a call reports into. It is cheap to clone and every
//! clone shares the same state, so workers can hold one each. The engine never
//! keeps a context between calls; callers that want to accumulate metrics
//! across calls pass the same context explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::events::{MapEvent, TraceEntry};
use crate::metrics::{MapMetrics, MetricsRecorder};

/// Shared, cloneable context observed by every worker of a map call.
///
/// # Example
///
/// ```rust
/// use parmap::{ExecutionContext, MapEvent};
///
/// let ctx = ExecutionContext::new();
/// ctx.emit(MapEvent::MapAborted {
///     name: "frames".to_string(),
///     reason: "disk full".to_string(),
/// });
///
/// assert_eq!(ctx.trace_snapshot().len(), 1);
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
    metrics: Arc<MetricsRecorder>,
    traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Create a context with a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create a context observing the given cancellation token.
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            metrics: Arc::new(MetricsRecorder::default()),
            traces: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The token map calls in this context stop on.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel all map calls running in this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns true once the context's token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Get a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> MapMetrics {
        self.metrics.snapshot()
    }

    /// Emit a structured event to the trace log.
    pub fn emit(&self, event: MapEvent) {
        let entry = TraceEntry::new(event);
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Get a snapshot of the current trace log.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear all trace entries.
    pub fn clear_traces(&self) {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
