//! Top-level runner for a step.

use tokio_util::sync::CancellationToken;

use crate::{step::Step, ExecutionContext, MapMetrics, Result};

/// Runs a step in a fresh [`ExecutionContext`] and returns its output along
/// with the metrics the run produced.
///
/// A workflow may be linked to a parent cancellation token; each run then gets
/// a child token, so cancelling the parent stops every run in progress.
///
/// # Example
///
/// ```rust
/// use parmap::{LambdaStep, StepExt, Workflow};
///
/// # tokio_test::block_on(async {
/// let resize = LambdaStep::new(|frame: u32| async move { Ok::<_, parmap::Error>(frame * 2) });
/// let workflow = Workflow::new(resize.bounded_map(4)).with_name("resize");
///
/// let (out, metrics) = workflow.run(vec![1, 2, 3]).await.unwrap();
/// assert_eq!(out, vec![2, 4, 6]);
/// assert_eq!(metrics.invocations, 3);
/// # });
/// ```
pub struct Workflow<S> {
    step: S,
    name: String,
    cancellation: Option<CancellationToken>,
}

impl<S: Step> Workflow<S> {
    /// Create a workflow wrapping the given step.
    pub fn new(step: S) -> Self {
        Self {
            step,
            name: "workflow".to_string(),
            cancellation: None,
        }
    }

    /// Set a human-readable name for this workflow.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Stop runs of this workflow when `parent` is cancelled.
    pub fn with_cancellation(mut self, parent: CancellationToken) -> Self {
        self.cancellation = Some(parent);
        self
    }

    /// Returns the name of this workflow.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the step in a fresh context, returning the output and metrics.
    pub async fn run(&self, input: S::Input) -> Result<(S::Output, MapMetrics)> {
        let ctx = match &self.cancellation {
            Some(parent) => ExecutionContext::with_cancellation(parent.child_token()),
            None => ExecutionContext::new(),
        };
        tracing::debug!(workflow = %self.name, step = self.step.name(), "running workflow");
        let output = self.step.run(&ctx, input).await?;
        Ok((output, ctx.snapshot()))
    }

    /// Run with a caller-provided context, e.g. to accumulate metrics across runs.
    pub async fn run_with_ctx(&self, ctx: &ExecutionContext, input: S::Input) -> Result<S::Output> {
        self.step.run(ctx, input).await
    }

    /// Access the inner step.
    pub fn inner(&self) -> &S {
        &self.step
    }
}
