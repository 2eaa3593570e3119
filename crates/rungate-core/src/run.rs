//! Job definitions and job runs.

use crate::{CoreError, DataInterval, JobId, RunId, RunState, ScheduleError, ScheduleSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered job: the thing a downstream run can depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Job identifier.
    pub job_id: JobId,

    /// When and how often the job fires.
    pub schedule: ScheduleSpec,
}

impl JobDefinition {
    /// Create a new JobDefinition.
    pub fn new(job_id: impl Into<JobId>, schedule: ScheduleSpec) -> Self {
        Self {
            job_id: job_id.into(),
            schedule,
        }
    }
}

/// One execution instance of a job at a specific logical time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// Unique run identifier.
    pub run_id: RunId,

    /// Job this run belongs to.
    pub job_id: JobId,

    /// Nominal scheduled time this run represents.
    pub logical_time: DateTime<Utc>,

    /// Current run state.
    pub state: RunState,

    /// Interval this run is responsible for.
    pub interval: DataInterval,
}

impl JobRun {
    /// Create a running JobRun with an explicit responsibility interval.
    pub fn new(job_id: impl Into<JobId>, logical_time: DateTime<Utc>, interval: DataInterval) -> Self {
        Self {
            run_id: RunId::generate(),
            job_id: job_id.into(),
            logical_time,
            state: RunState::Running,
            interval,
        }
    }

    /// Create a running JobRun whose interval is derived from the job's schedule.
    pub fn scheduled(job: &JobDefinition, logical_time: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let interval = job.schedule.interval_for(logical_time)?;
        Ok(Self::new(job.job_id.clone(), logical_time, interval))
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: RunId) -> Self {
        self.run_id = id;
        self
    }

    /// Builder method to set the state.
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }

    /// Move the run to `next`, refusing to rewrite a terminal state.
    pub fn transition(&mut self, next: RunState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Mark the run as succeeded.
    pub fn succeed(&mut self) -> Result<(), CoreError> {
        self.transition(RunState::Success)
    }

    /// Mark the run as failed.
    pub fn fail(&mut self) -> Result<(), CoreError> {
        self.transition(RunState::Failed)
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
