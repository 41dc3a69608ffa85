//! Index-tagged jobs and results.
//!
//! Inputs are tagged with their original position before being handed to the
//! worker pool, so completion order can differ freely from input order and
//! still be undone by [`reorder`] once every result is in.

use crate::error::BoxError;

/// A unit of work: an input value tagged with its position in the input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexedJob<T> {
    /// Position of `value` in the original input, dense over `0..len`.
    pub(crate) index: usize,
    /// The input value. Owned exclusively by the worker that pulls this job.
    pub(crate) value: T,
}

/// The outcome of running the transform on one [`IndexedJob`].
#[derive(Debug)]
pub(crate) struct IndexedResult<R> {
    /// Index of the job this result belongs to.
    pub(crate) index: usize,
    /// The transformed value, or the error the transform produced.
    pub(crate) outcome: Result<R, BoxError>,
}

/// Tag every input with its position, preserving input order.
pub(crate) fn index_jobs<T>(inputs: impl IntoIterator<Item = T>) -> Vec<IndexedJob<T>> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, value)| IndexedJob { index, value })
        .collect()
}

/// Sort completed `(index, value)` pairs by index and project out the values.
pub(crate) fn reorder<R>(mut completed: Vec<(usize, R)>) -> Vec<R> {
    completed.sort_by_key(|(index, _)| *index);
    completed.into_iter().map(|(_, value)| value).collect()
}
