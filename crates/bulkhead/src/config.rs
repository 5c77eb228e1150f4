//! Limits for the three primitives, from serde or the environment.

use serde::{Deserialize, Serialize};

pub const MAX_PERMITS_ENV: &str = "BULKHEAD_MAX_PERMITS";
pub const MAX_THREADS_ENV: &str = "BULKHEAD_MAX_THREADS";
pub const MAX_QUEUE_SIZE_ENV: &str = "BULKHEAD_MAX_QUEUE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Permits of an `AsyncSemaphore`.
    pub max_permits: usize,
    /// Drain loops of a `BoundedExecutor`.
    pub max_threads: usize,
    /// Total element weight of a `DynamicSizeBoundQueue`.
    pub max_queue_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_permits: 4,
            max_threads: 4,
            max_queue_size: 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    /// Defaults overlaid with any `BULKHEAD_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Overlay values found by `lookup`, then validate the result.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = parse(&lookup, MAX_PERMITS_ENV)? {
            self.max_permits = value;
        }
        if let Some(value) = parse(&lookup, MAX_THREADS_ENV)? {
            self.max_threads = value;
        }
        if let Some(value) = parse(&lookup, MAX_QUEUE_SIZE_ENV)? {
            self.max_queue_size = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_permits == 0 {
            return Err(ConfigError::Zero {
                field: "max_permits",
            });
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Zero {
                field: "max_threads",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Zero {
                field: "max_queue_size",
            });
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidEnv { var, value }),
    }
}
