//! Readiness state machine.
//!
//! ```text
//!            exists? no ───────────────► Failed(TargetNotFound)
//! Waiting ─► match? yes ───────────────► Ready
//!    ▲       elapsed >= timeout ───────► Failed(TimedOut)
//!    └────── otherwise: Pending
//! ```
//!
//! Each call is one poll. A context that has reached `Ready` or `Failed`
//! keeps returning that outcome without touching the registry or the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rungate_core::compute_interval;
use tracing::{debug, info, warn};

use crate::store::{JobRegistry, RunHistoryStore};
use crate::{
    CheckContext, CheckOutcome, ExistenceValidator, FailureReason, GateError, GateMetrics,
    RunMatcher,
};

/// Evaluates check contexts against a registry and a run history.
#[derive(Clone)]
pub struct ReadinessGate {
    existence: ExistenceValidator,
    matcher: RunMatcher,
    metrics: Arc<GateMetrics>,
}

impl ReadinessGate {
    /// Create a new ReadinessGate.
    pub fn new(registry: Arc<dyn JobRegistry>, history: Arc<dyn RunHistoryStore>) -> Self {
        Self {
            existence: ExistenceValidator::new(registry),
            matcher: RunMatcher::new(history),
            metrics: Arc::new(GateMetrics::new()),
        }
    }

    /// Counters for this gate.
    pub fn metrics(&self) -> &Arc<GateMetrics> {
        &self.metrics
    }

    /// Run one poll using the current wall-clock time.
    pub async fn check(&self, ctx: &mut CheckContext) -> Result<CheckOutcome, GateError> {
        self.check_at(ctx, Utc::now()).await
    }

    /// Run one poll at the caller-supplied time `now`.
    ///
    /// On success the context's poll state is updated and must be persisted
    /// by the caller. On error the context is left untouched.
    pub async fn check_at(
        &self,
        ctx: &mut CheckContext,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, GateError> {
        if let Some(outcome) = ctx.terminal_outcome() {
            debug!(
                own_job = %ctx.own_job_id,
                target_job = %ctx.target_job_id,
                outcome = %outcome,
                "Check already settled"
            );
            self.metrics.record_replay();
            return Ok(outcome);
        }

        let elapsed = ctx.elapsed_at(now);
        let outcome = match self.evaluate(ctx, elapsed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    own_job = %ctx.own_job_id,
                    target_job = %ctx.target_job_id,
                    error = %e,
                    "Dependency check could not complete"
                );
                self.metrics.record_error();
                return Err(e);
            }
        };

        ctx.record_poll(now, elapsed, outcome);
        self.metrics.record_outcome(outcome);

        match outcome {
            CheckOutcome::Ready => info!(
                own_job = %ctx.own_job_id,
                own_logical_time = %ctx.own_logical_time,
                target_job = %ctx.target_job_id,
                polls = ctx.state.polls,
                elapsed_secs = elapsed.as_secs(),
                "Upstream dependency satisfied"
            ),
            CheckOutcome::Pending => debug!(
                own_job = %ctx.own_job_id,
                target_job = %ctx.target_job_id,
                polls = ctx.state.polls,
                elapsed_secs = elapsed.as_secs(),
                timeout_secs = ctx.timeout.as_secs(),
                "Upstream dependency not ready"
            ),
            CheckOutcome::Failed(reason) => warn!(
                own_job = %ctx.own_job_id,
                own_logical_time = %ctx.own_logical_time,
                target_job = %ctx.target_job_id,
                reason = %reason,
                polls = ctx.state.polls,
                elapsed_secs = elapsed.as_secs(),
                "Dependency check failed"
            ),
        }

        Ok(outcome)
    }

    async fn evaluate(
        &self,
        ctx: &CheckContext,
        elapsed: Duration,
    ) -> Result<CheckOutcome, GateError> {
        if ctx.existence_check
            && !self
                .existence
                .exists(&ctx.target_job_id)
                .await
                .map_err(GateError::Registry)?
        {
            return Ok(CheckOutcome::Failed(FailureReason::TargetNotFound));
        }

        let interval = compute_interval(&ctx.own_schedule, ctx.own_logical_time)?;

        let matched = self
            .matcher
            .has_qualifying_run(&ctx.target_job_id, &interval)
            .await
            .map_err(GateError::Store)?;

        if matched {
            Ok(CheckOutcome::Ready)
        } else if elapsed >= ctx.timeout {
            Ok(CheckOutcome::Failed(FailureReason::TimedOut))
        } else {
            Ok(CheckOutcome::Pending)
        }
    }
}
