//! Map configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_name() -> String {
    "parmap".to_string()
}

/// Call-time parameters for a bounded map.
///
/// Missing fields fall back to their defaults when deserializing:
/// one worker per available CPU and the name `"parmap"`.
///
/// # Example
///
/// ```rust
/// use parmap::MapConfig;
///
/// let config = MapConfig::from_json(r#"{ "workers": 8, "name": "frames" }"#).unwrap();
/// assert_eq!(config.workers, 8);
/// assert_eq!(config.name, "frames");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Maximum number of transforms running at once. Must be at least one.
    pub workers: usize,
    /// Label used in logs and trace events.
    pub name: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            name: default_name(),
        }
    }
}

impl MapConfig {
    /// Create a configuration with the given worker count.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            name: default_name(),
        }
    }

    /// Set a human-readable name for this map.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration, failing with [`Error::Config`] if it is unusable.
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.workers)
    }
}

pub(crate) fn validate_workers(workers: usize) -> Result<()> {
    if workers < 1 {
        return Err(Error::Config(format!(
            "must have at least one worker, specified {workers}"
        )));
    }
    Ok(())
}
