//! Bounded-concurrency map over a collection of step inputs.

use async_trait::async_trait;
use std::sync::Arc;

use super::Step;
use crate::config::MapConfig;
use crate::engine::execute;
use crate::{ExecutionContext, Result};

/// A step that applies an inner step to each element of a `Vec` with at most
/// `workers` invocations in flight.
///
/// Outputs keep input order. The first failing element aborts the whole step
/// with [`Error::Transform`](crate::Error::Transform), and cancelling the
/// context's token aborts it with [`Error::Cancelled`](crate::Error::Cancelled).
/// Metrics and events are reported into the context the step runs with.
pub struct BoundedMapStep<S> {
    step: Arc<S>,
    config: MapConfig,
}

impl<S: Step> BoundedMapStep<S> {
    /// Wrap `step`, running it on at most `workers` elements at once.
    pub fn new(step: S, workers: usize) -> Self {
        Self::with_config(step, MapConfig::new(workers))
    }

    /// Wrap `step` using an explicit configuration.
    pub fn with_config(step: S, config: MapConfig) -> Self {
        Self {
            step: Arc::new(step),
            config,
        }
    }

    /// Access the inner step.
    pub fn inner(&self) -> &S {
        &self.step
    }

    /// Maximum number of elements processed at once.
    pub fn workers(&self) -> usize {
        self.config.workers
    }
}

#[async_trait]
impl<S> Step for BoundedMapStep<S>
where
    S: Step + 'static,
    S::Input: 'static,
    S::Output: 'static,
{
    type Input = Vec<S::Input>;
    type Output = Vec<S::Output>;

    async fn run(&self, ctx: &ExecutionContext, input: Vec<S::Input>) -> Result<Vec<S::Output>> {
        let step = Arc::clone(&self.step);
        let item_ctx = ctx.clone();
        execute(&self.config.name, ctx, input, self.config.workers, move |_, item| {
            let step = Arc::clone(&step);
            let ctx = item_ctx.clone();
            async move { step.run(&ctx, item).await }
        })
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}
