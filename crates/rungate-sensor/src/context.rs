//! Per-run check context and outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rungate_core::{JobId, ScheduleSpec};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, GateConfig};

/// Why a check ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The target job is not registered. Configuration error, never retried.
    TargetNotFound,
    /// No qualifying upstream run appeared before the timeout.
    TimedOut,
}

impl FailureReason {
    /// Lowercase name, as used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetNotFound => "target_not_found",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one gate invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    /// A qualifying upstream run exists; the downstream run may start.
    Ready,
    /// Not ready yet; poll again after the poke interval.
    Pending,
    /// Terminal failure.
    Failed(FailureReason),
}

impl CheckOutcome {
    /// Returns true for `Ready` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Pending => f.write_str("pending"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// State carried between polls of the same context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    /// Number of invocations that reached a decision.
    pub polls: u32,

    /// Largest elapsed wait observed so far.
    pub elapsed: Duration,

    /// Wall-clock time of the last decided poll.
    pub last_poll_at: Option<DateTime<Utc>>,

    /// Set once the check reaches `Ready` or `Failed`.
    pub terminal: Option<CheckOutcome>,
}

/// Everything one downstream run's dependency check needs.
///
/// Created once per downstream run and handed back to the gate on every poll.
/// The scheduler persists it (it is serializable) between suspensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckContext {
    /// The downstream job being gated.
    pub own_job_id: JobId,

    /// The downstream job's schedule.
    pub own_schedule: ScheduleSpec,

    /// Logical time of the downstream run being gated.
    pub own_logical_time: DateTime<Utc>,

    /// Upstream job that must have a successful run in the window.
    pub target_job_id: JobId,

    /// Fail fast if the target job is not registered.
    #[serde(default)]
    pub existence_check: bool,

    /// Minimum spacing between polls.
    pub poke_interval: Duration,

    /// Maximum total wait before failing with `TimedOut`.
    pub timeout: Duration,

    /// When the first poll of this context happened. Never changes.
    pub first_invocation: DateTime<Utc>,

    /// Progress recorded by the gate.
    #[serde(default)]
    pub state: PollState,
}

impl CheckContext {
    /// Create a context with default settings, first invoked at `now`.
    pub fn new(
        own_job_id: impl Into<JobId>,
        own_schedule: ScheduleSpec,
        own_logical_time: DateTime<Utc>,
        target_job_id: impl Into<JobId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::from_config(
            &GateConfig::default(),
            own_job_id,
            own_schedule,
            own_logical_time,
            target_job_id,
            now,
        )
    }

    /// Create a context taking the existence flag and timings from `config`.
    pub fn from_config(
        config: &GateConfig,
        own_job_id: impl Into<JobId>,
        own_schedule: ScheduleSpec,
        own_logical_time: DateTime<Utc>,
        target_job_id: impl Into<JobId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            own_job_id: own_job_id.into(),
            own_schedule,
            own_logical_time,
            target_job_id: target_job_id.into(),
            existence_check: config.existence_check,
            poke_interval: config.poke_interval(),
            timeout: config.timeout(),
            first_invocation: now,
            state: PollState::default(),
        }
    }

    /// Builder method to toggle the existence check.
    pub fn with_existence_check(mut self, enabled: bool) -> Self {
        self.existence_check = enabled;
        self
    }

    /// Builder method to set the poke interval.
    pub fn with_poke_interval(mut self, poke_interval: Duration) -> Self {
        self.poke_interval = poke_interval;
        self
    }

    /// Builder method to set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The terminal outcome, if one has been reached.
    pub fn terminal_outcome(&self) -> Option<CheckOutcome> {
        self.state.terminal
    }

    /// Wait time at `now`, never less than any value observed before.
    ///
    /// A clock reading earlier than `first_invocation` counts as zero.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        let measured = (now - self.first_invocation).to_std().unwrap_or(Duration::ZERO);
        measured.max(self.state.elapsed)
    }

    /// Earliest time the next poll should happen, or `None` once terminal.
    pub fn next_poke_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.state.terminal.is_some() {
            return None;
        }
        let base = self.state.last_poll_at.map_or(now, |last| last.max(now));
        let step = chrono::Duration::from_std(self.poke_interval).ok()?;
        base.checked_add_signed(step)
    }

    /// Reject contexts that cannot be polled, such as a hand-edited zero
    /// poke interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poke_interval.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "poke interval for upstream '{}' must be greater than zero",
                self.target_job_id
            )));
        }
        Ok(())
    }

    /// Record a decided poll.
    pub(crate) fn record_poll(&mut self, now: DateTime<Utc>, elapsed: Duration, outcome: CheckOutcome) {
        self.state.polls = self.state.polls.saturating_add(1);
        self.state.elapsed = elapsed;
        self.state.last_poll_at = Some(self.state.last_poll_at.map_or(now, |last| last.max(now)));
        if outcome.is_terminal() {
            self.state.terminal = Some(outcome);
        }
    }
}
