//! A single, well-known scratch directory for temporary files.
//!
//! Keeping every temporary file under one directory makes them easy to find
//! and to clean up in one go:
//!
//! ```rust,no_run
//! let frame = parmap::tmpdir::default_dir().join("00000001.jpg");
//! ```
//!
//! The location is taken from `MY_TMP_DIR` when set, so independent processes
//! can be given independent directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::warn;

use crate::{Error, Result};

/// Environment variable overriding the default location.
pub const DIR_ENV_VAR: &str = "MY_TMP_DIR";

/// Location used when `MY_TMP_DIR` is unset or empty.
pub const DEFAULT_DIR: &str = "/tmp/mytmp";

/// A scratch directory that is created on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpDir {
    path: PathBuf,
}

impl TmpDir {
    /// A scratch directory at `path`. Nothing is created until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location from `MY_TMP_DIR`, falling back to [`DEFAULT_DIR`].
    pub fn from_env() -> Self {
        match std::env::var_os(DIR_ENV_VAR) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_DIR),
        }
    }

    /// The configured path, without touching the filesystem.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the directory exists and return its path.
    ///
    /// Failing to create it is logged rather than returned, so callers can
    /// keep building paths; the failure resurfaces when they write.
    pub fn dir(&self) -> &Path {
        if let Err(err) = self.make() {
            warn!(error = %err, "could not create tmp dir");
        }
        &self.path
    }

    /// A path for `name` inside the directory, creating the directory if needed.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir().join(name)
    }

    /// Create the directory and any missing parents.
    pub fn make(&self) -> Result<()> {
        std::fs::create_dir_all(&self.path).map_err(|source| Error::Io {
            op: "making",
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the directory and everything in it. A missing directory is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(Error::Io {
                op: "removing",
                path: self.path.clone(),
                source: err,
            }),
            _ => Ok(()),
        }
    }

    /// Remove and recreate the directory, leaving it empty.
    pub fn reset(&self) -> Result<()> {
        self.remove()?;
        self.make()
    }
}

/// The process-wide scratch directory, resolved from the environment once.
pub fn default_dir() -> &'static TmpDir {
    static DEFAULT: OnceLock<TmpDir> = OnceLock::new();
    DEFAULT.get_or_init(TmpDir::from_env)
}
