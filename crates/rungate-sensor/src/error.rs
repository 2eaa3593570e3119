//! Sensor errors.
//!
//! Gate outcomes (`Pending`, `Failed(TargetNotFound)`, `Failed(TimedOut)`)
//! are not errors. Everything here means the gate could not reach a decision.

use rungate_core::{CoreError, ScheduleError};
use thiserror::Error;

/// Failure reported by a run-history store or job registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The query was rejected or failed while executing.
    #[error("Query failed: {0}")]
    Query(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Domain rule violated on the write path.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors surfaced by a gate invocation.
#[derive(Debug, Error)]
pub enum GateError {
    /// Run history could not be queried.
    #[error("Run history query failed: {0}")]
    Store(#[source] StoreError),

    /// Job registry could not be consulted.
    #[error("Job registry lookup failed: {0}")]
    Registry(#[source] StoreError),

    /// The downstream job's schedule could not produce an interval.
    #[error("Cannot compute dependency window: {0}")]
    Schedule(#[from] ScheduleError),
}

impl GateError {
    /// Whether retrying the same poll later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_)) | Self::Registry(StoreError::Unavailable(_))
        )
    }
}
