//! # parmap
//!
//! Bounded-concurrency, order-preserving, fail-fast map for Tokio.
//!
//! Given N inputs, a worker limit W and a per-item async transform, [`map`]
//! runs the transform over every input with at most W invocations in flight,
//! returns the results in input order, and returns early on the first error or
//! when the caller's [`CancellationToken`](tokio_util::sync::CancellationToken)
//! fires.
//!
//! ## Core Concepts
//!
//! - **map / map_blocking**: the engine, for async and for blocking transforms
//! - **ParMap**: a configured runner that reports into an [`ExecutionContext`]
//! - **MapConfig**: worker count and name, loadable from JSON
//! - **ExecutionContext**: cancellation token, [`MapMetrics`] and a trace of [`MapEvent`]s
//! - **BoundedMapStep**: the engine as a [`Step`] over `Vec`s
//! - **Workflow**: runs a step in a fresh context and returns its metrics
//! - **map_json**: type-erased intake over `serde_json::Value`
//! - **Seq** and **TmpDir**: helpers for naming and placing per-item output
//!
//! ## Guarantees
//!
//! - On success the output has exactly one value per input, in input order.
//! - Workers check cancellation and the fail-fast gate only between jobs, so
//!   after an error or cancellation at most one extra invocation per worker
//!   may still run. This overrun is expected, not a bug.
//! - No state is kept between calls, and every spawned worker exits once the
//!   call returns.
//!
//! ## Example
//!
//! ```rust
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let cancel = CancellationToken::new();
//! let names = parmap::map(&cancel, 0..4, 2, |index, frame: u32| async move {
//!     Ok::<_, parmap::Error>(format!("{index}:{frame:05}.jpg"))
//! })
//! .await
//! .unwrap();
//!
//! assert_eq!(names[3], "3:00003.jpg");
//!
//! let err = parmap::map(&cancel, 0..4, 2, |_, frame: u32| async move {
//!     if frame == 3 {
//!         return Err(parmap::Error::from("not a fan of 3"));
//!     }
//!     Ok(frame)
//! })
//! .await
//! .unwrap_err();
//!
//! assert_eq!(err.to_string(), "index 3: not a fan of 3");
//! # });
//! ```

pub mod config;
pub mod context;
pub mod erased;
pub mod error;
pub mod events;
pub mod metrics;
pub mod seq;
pub mod step;
pub mod tmpdir;
pub mod workflow;

mod collector;
mod engine;
mod gate;
mod job;
mod pool;

pub use config::MapConfig;
pub use context::ExecutionContext;
pub use engine::{cancel_after, map, map_blocking, ParMap};
pub use erased::{inputs_from_value, map_json, outputs_to_value};
pub use error::{BoxError, Error, Result, TransformPanic};
pub use events::{MapEvent, TraceEntry};
pub use metrics::MapMetrics;
pub use seq::Seq;
pub use step::{BoundedMapStep, LambdaStep, Step, StepExt};
pub use tmpdir::TmpDir;
pub use workflow::Workflow;
