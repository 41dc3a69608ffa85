//! Result collection for a single map call.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::job::IndexedResult;
use crate::{Error, Result};

/// Wait until `expected` successful results have arrived, a result carries an
/// error, or `cancel` fires, whichever the select observes first.
///
/// Returns the successful `(index, value)` pairs in completion order. Early
/// returns do not wait for workers still running; they stop on their own.
pub(crate) async fn collect<R>(
    expected: usize,
    results: &mut mpsc::UnboundedReceiver<IndexedResult<R>>,
    cancel: &CancellationToken,
) -> Result<Vec<(usize, R)>> {
    let mut completed = Vec::with_capacity(expected);

    while completed.len() < expected {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = results.recv() => match next {
                Some(IndexedResult { index, outcome: Ok(value) }) => completed.push((index, value)),
                Some(IndexedResult { index, outcome: Err(source) }) => {
                    if cancel.is_cancelled() || is_nested_cancellation(&source) {
                        return Err(Error::Cancelled);
                    }
                    return Err(Error::Transform { index, source });
                }
                // Every worker exited; they only do that early on cancellation.
                None if cancel.is_cancelled() => return Err(Error::Cancelled),
                None => {
                    return Err(Error::Execution(format!(
                        "workers exited after {} of {} results",
                        completed.len(),
                        expected
                    )));
                }
            },
        }
    }

    Ok(completed)
}

/// A transform that is itself a map (e.g. a nested `BoundedMapStep`) reports
/// cancellation as its own error; that is not an item failure.
fn is_nested_cancellation(source: &BoxError) -> bool {
    matches!(source.downcast_ref::<Error>(), Some(Error::Cancelled))
}
