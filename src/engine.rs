//! The bounded-concurrency map engine.
//!
//! A call enqueues every input tagged with its index, spawns
//! exactly `workers` tasks that pull from the queue, and collects their results
//! until all are in, one fails, or the caller's token is cancelled. On success
//! the results are put back into input order.
//!
//! Cancellation and failure are cooperative: workers look at the token and the
//! fail-fast gate only between jobs, so a running transform is never
//! interrupted. After the call returns, at most one in-flight invocation per
//! worker may still be finishing in the background.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collector::collect;
use crate::config::{validate_workers, MapConfig};
use crate::error::{BoxError, TransformPanic};
use crate::events::MapEvent;
use crate::gate::FailFastGate;
use crate::job::{index_jobs, reorder};
use crate::pool::{spawn_workers, Shared};
use crate::{Error, ExecutionContext, Result};

/// Map `transform` over `inputs` with at most `workers` invocations in flight.
///
/// Results come back in input order. The first transform error is returned
/// as [`Error::Transform`] carrying the failing index, and cancelling `cancel`
/// returns [`Error::Cancelled`]; both return without waiting for the remaining
/// workers. `workers == 0` fails with [`Error::Config`] before anything is
/// spawned, and empty input succeeds without invoking `transform`.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let cancel = CancellationToken::new();
/// let out = parmap::map(&cancel, vec![1, 2, 3], 2, |_index, n: i32| async move {
///     Ok::<_, parmap::Error>(n.to_string())
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(out, vec!["1", "2", "3"]);
/// # });
/// ```
pub async fn map<T, R, I, F, Fut, E>(
    cancel: &CancellationToken,
    inputs: I,
    workers: usize,
    transform: F,
) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    let ctx = ExecutionContext::with_cancellation(cancel.clone());
    execute("parmap", &ctx, inputs, workers, transform).await
}

/// Like [`map`], for synchronous transforms that block or burn CPU.
///
/// Each invocation runs on Tokio's blocking thread pool, still bounded by
/// `workers`. A blocking invocation cannot be interrupted, so it always runs
/// to completion even after the call has returned.
///
/// # Example
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let cancel = CancellationToken::new();
/// let squares = parmap::map_blocking(&cancel, 0..4u64, 2, |_index, n| {
///     Ok::<_, parmap::Error>(n * n)
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(squares, vec![0, 1, 4, 9]);
/// # });
/// ```
pub async fn map_blocking<T, R, I, F, E>(
    cancel: &CancellationToken,
    inputs: I,
    workers: usize,
    transform: F,
) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> std::result::Result<R, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    let ctx = ExecutionContext::with_cancellation(cancel.clone());
    execute("parmap", &ctx, inputs, workers, on_blocking_pool(transform)).await
}

/// Cancel `token` once `after` has elapsed, turning it into a deadline.
///
/// Returns the timer task; aborting it disarms the deadline.
pub fn cancel_after(token: &CancellationToken, after: Duration) -> JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        token.cancel();
    })
}

/// A configured map runner that reports into an [`ExecutionContext`].
///
/// # Example
///
/// ```rust
/// use parmap::ParMap;
///
/// # tokio_test::block_on(async {
/// let par = ParMap::new(4).with_name("double");
/// let out = par
///     .run(vec![1, 2, 3], |_i, n: u32| async move { Ok::<_, parmap::Error>(n * 2) })
///     .await
///     .unwrap();
///
/// assert_eq!(out, vec![2, 4, 6]);
/// assert_eq!(par.context().snapshot().invocations, 3);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ParMap {
    config: MapConfig,
    ctx: ExecutionContext,
}

impl ParMap {
    /// Create a runner with `workers` workers and a fresh context.
    pub fn new(workers: usize) -> Self {
        Self::from_config(MapConfig::new(workers))
    }

    /// Create a runner from a configuration.
    pub fn from_config(config: MapConfig) -> Self {
        Self {
            config,
            ctx: ExecutionContext::new(),
        }
    }

    /// Set the name used in logs and trace events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Report into (and stop on the cancellation token of) `ctx`.
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Stop on `token` instead of the current context's token.
    ///
    /// Replaces the context, discarding any metrics gathered so far.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx = ExecutionContext::with_cancellation(token);
        self
    }

    /// The configuration this runner uses.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// The context this runner reports into.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Run an async transform over `inputs`. See [`map`].
    pub async fn run<T, R, I, F, Fut, E>(&self, inputs: I, transform: F) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        execute(&self.config.name, &self.ctx, inputs, self.config.workers, transform).await
    }

    /// Run a blocking transform over `inputs`. See [`map_blocking`].
    pub async fn run_blocking<T, R, I, F, E>(&self, inputs: I, transform: F) -> Result<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> std::result::Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        execute(
            &self.config.name,
            &self.ctx,
            inputs,
            self.config.workers,
            on_blocking_pool(transform),
        )
        .await
    }
}

/// Wrap a synchronous transform so each invocation runs via `spawn_blocking`.
fn on_blocking_pool<T, R, F, E>(
    transform: F,
) -> impl Fn(usize, T) -> BoxFuture<'static, std::result::Result<R, BoxError>> + Send + Sync + 'static
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> std::result::Result<R, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    let transform = Arc::new(transform);
    move |index: usize, value: T| -> BoxFuture<'static, std::result::Result<R, BoxError>> {
        let transform = Arc::clone(&transform);
        async move {
            let joined = tokio::task::spawn_blocking(move || {
                transform(index, value).map_err(Into::<BoxError>::into)
            })
            .await;
            match joined {
                Ok(outcome) => outcome,
                Err(join) if join.is_panic() => {
                    Err(Box::new(TransformPanic::from_payload(join.into_panic())) as BoxError)
                }
                Err(join) => Err(Box::new(join) as BoxError),
            }
        }
        .boxed()
    }
}

pub(crate) async fn execute<T, R, I, F, Fut, E>(
    name: &str,
    ctx: &ExecutionContext,
    inputs: I,
    workers: usize,
    transform: F,
) -> Result<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    validate_workers(workers)?;

    let jobs = index_jobs(inputs);
    let expected = jobs.len();
    if expected == 0 {
        return Ok(Vec::new());
    }

    ctx.metrics().record_run();
    ctx.emit(MapEvent::MapStart {
        name: name.to_string(),
        items: expected,
        workers,
    });
    debug!(map = name, items = expected, workers, "starting bounded map");
    let started = Instant::now();

    // Every job is queued before any worker starts, so intake never waits on
    // consumption. Dropping the sender lets an empty queue read as closed.
    let (jobs_tx, jobs_rx) = async_channel::bounded(expected);
    for job in jobs {
        if let Err(rejected) = jobs_tx.try_send(job) {
            return Err(Error::Execution(format!(
                "job queue rejected index {}",
                rejected.into_inner().index
            )));
        }
    }
    drop(jobs_tx);

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let shutdown = ctx.cancellation().child_token();
    // Stops the workers on every return path, including this future being dropped.
    let _stop_workers = shutdown.clone().drop_guard();

    spawn_workers(
        workers,
        Shared {
            jobs: jobs_rx,
            results: results_tx,
            gate: Arc::new(FailFastGate::new()),
            shutdown,
            ctx: ctx.clone(),
            transform: Arc::new(transform),
        },
    );

    match collect(expected, &mut results_rx, ctx.cancellation()).await {
        Ok(completed) => {
            let duration_ms = started.elapsed().as_millis();
            debug!(map = name, items = expected, elapsed_ms = duration_ms as u64, "bounded map finished");
            ctx.emit(MapEvent::MapEnd {
                name: name.to_string(),
                items: expected,
                duration_ms,
            });
            Ok(reorder(completed))
        }
        Err(err) => {
            debug!(map = name, error = %err, "bounded map aborted");
            ctx.emit(MapEvent::MapAborted {
                name: name.to_string(),
                reason: err.to_string(),
            });
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity_inputs(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    async fn identity(n: usize, workers: usize) -> Result<Vec<usize>> {
        map(&CancellationToken::new(), identity_inputs(n), workers, |_, item: usize| async move {
            Ok::<_, Error>(item)
        })
        .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_order_preserved_for_all_worker_counts() {
        for n in [1usize, 2, 3, 7, 16, 100] {
            for workers in [1, n.div_ceil(2).max(1), n, 2 * n] {
                let out = identity(n, workers).await.unwrap();
                assert_eq!(out, identity_inputs(n), "n={n} workers={workers}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_order_preserved_when_completion_is_reversed() {
        let out = map(&CancellationToken::new(), 0..8u64, 8, |_, n| async move {
            tokio::time::sleep(Duration::from_millis(10 * (8 - n))).await;
            Ok::<_, Error>(n * 10)
        })
        .await
        .unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn test_zero_workers_is_config_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = map(&CancellationToken::new(), vec![0, 1, 2, 3], 0, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(n) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("worker"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(tokio::runtime::Handle::current().metrics().num_alive_tasks(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_never_invokes_transform() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let out = map(&CancellationToken::new(), Vec::<i32>::new(), 4, move |_, n| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(n) }
        })
        .await
        .unwrap();

        assert!(out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_in_parallel() {
        let started = Instant::now();
        let out = map(&CancellationToken::new(), 0..10, 10, |_, n: i32| async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, Error>(n)
        })
        .await
        .unwrap();

        assert_eq!(out.len(), 10);
        // Sequential execution would take 2.5s.
        assert!(started.elapsed() < Duration::from_millis(1000), "took {:?}", started.elapsed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        let out = map(&CancellationToken::new(), 0..12, 3, move |_, n: i32| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, Error>(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_always_reported_with_index() {
        // Repeated to catch a collector that finishes before seeing the error.
        for _ in 0..4100 {
            let err = map(&CancellationToken::new(), vec![0, 1, 2, 3], 2, |_, n: i32| async move {
                if n == 3 {
                    return Err(Error::from("not a fan of 3"));
                }
                Ok(n.to_string())
            })
            .await
            .unwrap_err();

            assert_eq!(err.transform_index(), Some(3));
            assert!(err.to_string().contains("not a fan of 3"), "got {err}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_bounds_further_invocations() {
        let workers = 2;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = map(&CancellationToken::new(), 0..20, workers, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    return Err(Error::from("first item is bad"));
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(n)
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.transform_index(), Some(0));

        // Let in-flight invocations finish before counting.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let ran = calls.load(Ordering::SeqCst);
        assert!((1..=workers + 1).contains(&ran), "ran {ran} times");
    }

    #[tokio::test]
    async fn test_error_stops_single_worker() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = map(&cancel, 0..10, 1, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 2 {
                    return Err(Error::from("2 is bad"));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(n)
            }
        })
        .await;

        assert!(result.is_err());
        tokio::time::sleep(Duration::from_millis(150)).await;
        let ran = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&ran), "ran {ran} times");
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_jobs() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = map(&cancel, 0..10, 1, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, Error>(n)
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let ran = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&ran), "ran {ran} times");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancellation_with_many_workers_is_bounded() {
        let workers = 4;
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = map(&cancel, 0..40, workers, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, Error>(n)
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        tokio::time::sleep(Duration::from_millis(300)).await;
        let ran = calls.load(Ordering::SeqCst);
        assert!((1..=workers + 1).contains(&ran), "ran {ran} times");
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = identity_with(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    async fn identity_with(cancel: &CancellationToken) -> Result<Vec<i32>> {
        map(cancel, vec![1, 2, 3], 2, |_, n: i32| async move { Ok::<_, Error>(n) }).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_leaked_workers_after_repeated_failures() {
        for _ in 0..2000 {
            let result = map(&CancellationToken::new(), 0..16, 8, |_, n: i32| async move {
                if n == 5 {
                    return Err(Error::from("boom"));
                }
                Ok(n)
            })
            .await;
            assert!(result.is_err());
        }

        let metrics = tokio::runtime::Handle::current().metrics();
        let mut alive = metrics.num_alive_tasks();
        for _ in 0..200 {
            if alive == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            alive = metrics.num_alive_tasks();
        }
        assert_eq!(alive, 0, "workers still alive after failing calls");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dropping_the_call_stops_workers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cancel = CancellationToken::new();
        let call = map(&cancel, 0..50, 2, move |_, n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, Error>(n)
            }
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(30), call).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let ran = calls.load(Ordering::SeqCst);
        assert!(ran < 50, "workers kept running after the call was dropped");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), ran);
    }

    #[tokio::test]
    async fn test_panicking_transform_is_transform_error() {
        let err = map(&CancellationToken::new(), vec![0, 1], 1, |_, n: i32| async move {
            if n == 1 {
                panic!("cannot handle 1");
            }
            Ok::<_, Error>(n)
        })
        .await
        .unwrap_err();

        assert_eq!(err.transform_index(), Some(1));
        assert!(err.to_string().contains("cannot handle 1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blocking_transform_runs_in_parallel() {
        let started = Instant::now();
        let out = map_blocking(&CancellationToken::new(), 0..8, 8, |index, n: i32| {
            std::thread::sleep(Duration::from_millis(200));
            Ok::<_, Error>((index, n * 2))
        })
        .await
        .unwrap();

        assert_eq!(out, (0..8).map(|n| (n as usize, n * 2)).collect::<Vec<_>>());
        assert!(started.elapsed() < Duration::from_millis(1000), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_blocking_error_and_panic() {
        let err = map_blocking(&CancellationToken::new(), vec![1, 2, 3], 1, |_, n: i32| {
            if n == 2 {
                Err(Error::from("two"))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.transform_index(), Some(1));

        let err = map_blocking(&CancellationToken::new(), vec![1], 1, |_, _n: i32| -> Result<i32> {
            panic!("blocking boom")
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("blocking boom"));
    }

    #[tokio::test]
    async fn test_parmap_records_metrics_and_events() {
        let par = ParMap::from_config(MapConfig::new(2).with_name("frames"));
        let out = par
            .run(vec!["a", "bb", "ccc"], |_, s: &'static str| async move { Ok::<_, Error>(s.len()) })
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);

        let m = par.context().snapshot();
        assert_eq!(m.runs, 1);
        assert_eq!(m.invocations, 3);
        assert_eq!(m.succeeded, 3);
        assert!(!m.has_failures());

        let trace = par.context().trace_snapshot();
        assert!(matches!(
            &trace.first().unwrap().event,
            MapEvent::MapStart { name, items: 3, workers: 2 } if name == "frames"
        ));
        assert!(matches!(&trace.last().unwrap().event, MapEvent::MapEnd { items: 3, .. }));
    }

    #[tokio::test]
    async fn test_parmap_failure_is_traced() {
        let par = ParMap::new(1).with_name("picky");
        let err = par
            .run_blocking(vec![1, 2], |_, n: i32| {
                if n == 2 {
                    Err(Error::from("nope"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.transform_index(), Some(1));

        assert_eq!(par.context().snapshot().failed, 1);
        let trace = par.context().trace_snapshot();
        assert!(trace
            .iter()
            .any(|e| matches!(&e.event, MapEvent::ItemFailed { index: 1, message } if message == "nope")));
        assert!(matches!(&trace.last().unwrap().event, MapEvent::MapAborted { name, .. } if name == "picky"));
    }

    #[tokio::test]
    async fn test_parmap_with_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let par = ParMap::new(2).with_cancellation(cancel);
        let err = par
            .run(vec![1], |_, n: i32| async move { Ok::<_, Error>(n) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
