//! Error types for bounded map execution.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by a caller-supplied transform.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for map operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An invalid call-time parameter, such as a worker count below one.
    #[error("Config error: {0}")]
    Config(String),

    /// A value could not be adapted to or from the type the engine works with.
    #[error("cannot convert {value}: {reason}")]
    Conversion {
        /// Rendering of the offending value.
        value: String,
        /// Why the conversion failed.
        reason: String,
    },

    /// The transform returned an error (or panicked) for the item at `index`.
    #[error("index {index}: {source}")]
    Transform {
        /// Original input position of the failing item.
        index: usize,
        /// The error produced by the transform.
        #[source]
        source: BoxError,
    },

    /// The caller's cancellation token fired before all work completed.
    #[error("map cancelled before all items completed")]
    Cancelled,

    /// The engine could not finish for an internal reason.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A filesystem operation failed.
    #[error("{op} {}: {source}", path.display())]
    Io {
        /// What was being attempted, e.g. "removing".
        op: &'static str,
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error with a message.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Returns true if this error reports cancellation by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The input index a transform failed on, if this is a transform error.
    pub fn transform_index(&self) -> Option<usize> {
        match self {
            Error::Transform { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Message(msg.to_string())
    }
}

/// Raised in place of a transform that panicked.
#[derive(Error, Debug)]
#[error("transform panicked: {0}")]
pub struct TransformPanic(pub String);

impl TransformPanic {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TransformPanic(message)
    }
}

/// A specialized `Result` type for map operations.
pub type Result<T> = std::result::Result<T, Error>;
