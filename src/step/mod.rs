//! Async steps and the bounded map step built on the engine.
//!
//! A [`Step`] transforms one input into one output given an
//! [`ExecutionContext`]. Wrapping a per-item step with
//! [`StepExt::bounded_map`] yields a step over `Vec`s that runs the inner step
//! with bounded concurrency, preserves order and fails fast.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use crate::{ExecutionContext, Result};

pub mod bounded;

pub use bounded::BoundedMapStep;

/// An async unit of work with typed input and output.
///
/// # Example
///
/// ```rust
/// use parmap::{ExecutionContext, LambdaStep, Step};
///
/// # tokio_test::block_on(async {
/// let double = LambdaStep::new(|x: i32| async move { Ok::<i32, parmap::Error>(x * 2) });
/// assert_eq!(double.run(&ExecutionContext::new(), 21).await.unwrap(), 42);
/// # });
/// ```
#[async_trait]
pub trait Step: Send + Sync {
    /// The input type for this step.
    type Input: Send;
    /// The output type produced by this step.
    type Output: Send;

    /// Execute this step with the provided context and input.
    async fn run(&self, ctx: &ExecutionContext, input: Self::Input) -> Result<Self::Output>;

    /// Returns a human-readable name for this step. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A step backed by an async closure.
pub struct LambdaStep<I, O, F> {
    f: F,
    _phantom: PhantomData<fn(I) -> O>,
}

impl<I, O, F, Fut> LambdaStep<I, O, F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    /// Create a step from the given async closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F, Fut> Step for LambdaStep<I, O, F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn run(&self, _ctx: &ExecutionContext, input: I) -> Result<O> {
        (self.f)(input).await
    }
}

/// Extension methods available on every [`Step`].
pub trait StepExt: Step + Sized {
    /// Run this step over every element of a `Vec`, at most `workers` at a time.
    ///
    /// # Example
    ///
    /// ```rust
    /// use parmap::{ExecutionContext, LambdaStep, Step, StepExt};
    ///
    /// # tokio_test::block_on(async {
    /// let step = LambdaStep::new(|x: u8| async move { Ok::<u8, parmap::Error>(x + 1) })
    ///     .bounded_map(2);
    /// let out = step.run(&ExecutionContext::new(), vec![1, 2, 3]).await.unwrap();
    /// assert_eq!(out, vec![2, 3, 4]);
    /// # });
    /// ```
    fn bounded_map(self, workers: usize) -> BoundedMapStep<Self> {
        BoundedMapStep::new(self, workers)
    }
}

impl<T: Step + Sized> StepExt for T {}
