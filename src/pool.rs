//! Worker pool: a fixed number of Tokio tasks pulling from a shared job queue.
//!
//! The job queue is an `async_channel` whose receiver is cloned into every
//! worker, so jobs are handed out first-come-first-served without a mutex.
//! Results go back over an unbounded `mpsc` channel, which keeps a worker from
//! ever blocking on publish while the collector is already gone.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{BoxError, TransformPanic};
use crate::events::MapEvent;
use crate::gate::FailFastGate;
use crate::job::{IndexedJob, IndexedResult};
use crate::ExecutionContext;

/// Everything a worker shares with its siblings.
pub(crate) struct Shared<T, R, F> {
    pub(crate) jobs: async_channel::Receiver<IndexedJob<T>>,
    pub(crate) results: mpsc::UnboundedSender<IndexedResult<R>>,
    pub(crate) gate: Arc<FailFastGate>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) ctx: ExecutionContext,
    pub(crate) transform: Arc<F>,
}

impl<T, R, F> Clone for Shared<T, R, F> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            results: self.results.clone(),
            gate: Arc::clone(&self.gate),
            shutdown: self.shutdown.clone(),
            ctx: self.ctx.clone(),
            transform: Arc::clone(&self.transform),
        }
    }
}

/// Spawn exactly `workers` tasks sharing `shared`.
///
/// Tasks are detached: they end on their own once the queue is drained, the
/// gate trips or `shutdown` is cancelled.
pub(crate) fn spawn_workers<T, R, F, Fut, E>(workers: usize, shared: Shared<T, R, F>)
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    for id in 0..workers {
        tokio::spawn(work(id, shared.clone()));
    }
}

fn should_stop<T, R, F>(id: usize, shared: &Shared<T, R, F>) -> bool {
    if shared.shutdown.is_cancelled() {
        trace!(worker = id, "cancellation observed, worker exiting");
        return true;
    }
    if shared.gate.is_tripped() {
        trace!(worker = id, "fail-fast gate tripped, worker exiting");
        return true;
    }
    false
}

async fn work<T, R, F, Fut, E>(id: usize, shared: Shared<T, R, F>)
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Into<BoxError>,
{
    loop {
        if should_stop(id, &shared) {
            break;
        }
        let Ok(IndexedJob { index, value }) = shared.jobs.recv().await else {
            trace!(worker = id, "job queue drained, worker exiting");
            break;
        };
        // The state may have changed while this worker was waiting on the queue.
        if should_stop(id, &shared) {
            shared.ctx.metrics().record_skip();
            break;
        }

        shared.ctx.metrics().record_invocation();
        let transform = Arc::clone(&shared.transform);
        let outcome = AssertUnwindSafe(async move { transform(index, value).await })
            .catch_unwind()
            .await;

        let outcome: Result<R, BoxError> = match outcome {
            Ok(Ok(output)) => {
                shared.ctx.metrics().record_success();
                Ok(output)
            }
            Ok(Err(err)) => Err(err.into()),
            Err(payload) => Err(Box::new(TransformPanic::from_payload(payload))),
        };

        if let Err(err) = &outcome {
            shared.gate.trip();
            shared.ctx.metrics().record_failure();
            debug!(worker = id, index, error = %err, "transform failed, tripping fail-fast gate");
            shared.ctx.emit(MapEvent::ItemFailed {
                index,
                message: err.to_string(),
            });
        }

        if shared.results.send(IndexedResult { index, outcome }).is_err() {
            trace!(worker = id, "collector gone, worker exiting");
            break;
        }
    }
}
