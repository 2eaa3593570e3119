//! Collaborator interfaces the gate reads from.
//!
//! The gate never writes through these traits. Implementations own their
//! write path and must make a run marked `Success` visible to the next read.

use std::collections::HashSet;

use async_trait::async_trait;
use rungate_core::{DataInterval, JobId, JobRun, RunState};

use crate::StoreError;

/// Filter over run history: one job, a logical-time range, optional states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQuery {
    /// Job whose runs are requested.
    pub job_id: JobId,

    /// Runs are selected by logical time within this half-open range.
    pub logical_range: DataInterval,

    /// Restrict to these states. `None` returns runs in any state.
    pub states: Option<HashSet<RunState>>,
}

impl RunQuery {
    /// Query every run of `job_id` whose logical time is in `logical_range`.
    pub fn new(job_id: JobId, logical_range: DataInterval) -> Self {
        Self {
            job_id,
            logical_range,
            states: None,
        }
    }

    /// Builder method to restrict the query to the given states.
    pub fn with_states(mut self, states: impl IntoIterator<Item = RunState>) -> Self {
        self.states = Some(states.into_iter().collect());
        self
    }

    /// Whether `run` satisfies every part of this filter.
    pub fn matches(&self, run: &JobRun) -> bool {
        run.job_id == self.job_id
            && self.logical_range.contains(run.logical_time)
            && self
                .states
                .as_ref()
                .map_or(true, |states| states.contains(&run.state))
    }
}

/// Read access to the history of job runs.
#[async_trait]
pub trait RunHistoryStore: Send + Sync {
    /// Return every run matching `query`, in no particular order.
    async fn query_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError>;
}

/// Lookup of registered job definitions.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Whether a job with this id is registered.
    async fn exists(&self, job_id: &JobId) -> Result<bool, StoreError>;
}
