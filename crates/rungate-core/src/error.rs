//! Core domain errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core domain errors for RunGate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Run already recorded under the same identifier.
    #[error("Run already exists: {0}")]
    DuplicateRun(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Schedule could not be evaluated.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Errors raised while parsing or evaluating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The schedule expression is empty or malformed.
    #[error("Invalid schedule '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    /// The logical time precedes the schedule's first valid time.
    #[error("Logical time {logical_time} is before schedule start {start}")]
    BeforeStart {
        logical_time: DateTime<Utc>,
        start: DateTime<Utc>,
    },

    /// The schedule never fires after the given logical time.
    #[error("Schedule '{expr}' has no firing after {after}")]
    NoNextFiring { expr: String, after: DateTime<Utc> },

    /// An interval was requested with a non-positive span.
    #[error("Empty interval: start {start} is not before end {end}")]
    EmptyInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
