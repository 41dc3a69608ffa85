//! Type-erased intake over JSON.
//!
//! The engine itself is generic, so this is only needed where inputs arrive
//! untyped, such as a job description read from disk. Values that do not fit
//! the expected element type are reported as [`Error::Conversion`] naming the
//! offending value instead of panicking.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::{map, Error, Result};

const MAX_RENDERED_LEN: usize = 120;

fn render(value: &Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > MAX_RENDERED_LEN {
        let mut cut = MAX_RENDERED_LEN;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    rendered
}

/// Interpret `value` as a homogeneous array of `T`.
///
/// # Example
///
/// ```rust
/// let inputs: Vec<u32> = parmap::inputs_from_value(serde_json::json!([1, 2, 3])).unwrap();
/// assert_eq!(inputs, vec![1, 2, 3]);
///
/// let err = parmap::inputs_from_value::<u32>(serde_json::json!([1, "two"])).unwrap_err();
/// assert!(err.to_string().contains("\"two\""));
/// ```
pub fn inputs_from_value<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => {
            return Err(Error::Conversion {
                value: "null".to_string(),
                reason: "null given where an array was expected".to_string(),
            })
        }
        other => {
            return Err(Error::Conversion {
                value: render(&other),
                reason: "given a non-array value".to_string(),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let rendered = render(&item);
            serde_json::from_value(item).map_err(|err| Error::Conversion {
                value: rendered,
                reason: format!("element {index}: {err}"),
            })
        })
        .collect()
}

/// Serialize transformed values back into a JSON array.
pub fn outputs_to_value<R: Serialize>(outputs: Vec<R>) -> Result<Value> {
    outputs
        .into_iter()
        .enumerate()
        .map(|(index, output)| {
            serde_json::to_value(output).map_err(|err| Error::Conversion {
                value: format!("output at index {index}"),
                reason: err.to_string(),
            })
        })
        .collect::<Result<Vec<Value>>>()
        .map(Value::Array)
}

/// Decode `inputs` as an array of `T`, [`map`] over it and encode the results.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let out = parmap::map_json(&CancellationToken::new(), json!([0, 1, 2, 3]), 2, |_i, n: i64| async move {
///     Ok::<_, parmap::Error>(n.to_string())
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(out, json!(["0", "1", "2", "3"]));
/// # });
/// ```
pub async fn map_json<T, R, F, Fut, E>(
    cancel: &CancellationToken,
    inputs: Value,
    workers: usize,
    transform: F,
) -> Result<Value>
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    let inputs: Vec<T> = inputs_from_value(inputs)?;
    let outputs = map(cancel, inputs, workers, transform).await?;
    outputs_to_value(outputs)
}
