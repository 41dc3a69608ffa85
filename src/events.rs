//! Structured map execution events for tracing and observability.
//!
//! Events are recorded into an [`ExecutionContext`](crate::ExecutionContext)
//! trace log and are serializable, so a whole run can be exported as JSON.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Events that can be emitted during a map call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MapEvent {
    /// A map call has started.
    MapStart {
        /// Name of the map, from its configuration.
        name: String,
        /// Number of input items.
        items: usize,
        /// Number of workers spawned.
        workers: usize,
    },
    /// A transform invocation failed and tripped the fail-fast gate.
    ItemFailed {
        /// Input index of the failing item.
        index: usize,
        /// Error message from the transform.
        message: String,
    },
    /// A map call finished with every item transformed.
    MapEnd {
        /// Name of the map.
        name: String,
        /// Number of results returned.
        items: usize,
        /// Wall-clock duration of the call in milliseconds.
        duration_ms: u128,
    },
    /// A map call returned early because of an error or cancellation.
    MapAborted {
        /// Name of the map.
        name: String,
        /// The error that ended the call.
        reason: String,
    },
}

/// A timestamped trace entry containing a [`MapEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix epoch timestamp in milliseconds when this event occurred.
    pub timestamp: u128,
    /// The event that was recorded.
    #[serde(flatten)]
    pub event: MapEvent,
}

impl TraceEntry {
    /// Create a new trace entry stamped with the current time.
    #[must_use]
    pub fn new(event: MapEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self { timestamp, event }
    }
}
