//! Gate configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Defaults applied to every new check context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Spacing between polls (seconds).
    pub poke_interval_secs: u64,

    /// Give up after waiting this long (seconds).
    pub timeout_secs: u64,

    /// Fail fast when the upstream job is not registered.
    pub existence_check: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poke_interval_secs: 1200,
            timeout_secs: 24 * 60 * 60,
            existence_check: false,
        }
    }
}

impl GateConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reject settings the gate cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poke_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poke_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Poke interval as a Duration.
    pub fn poke_interval(&self) -> Duration {
        Duration::from_secs(self.poke_interval_secs)
    }

    /// Timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
