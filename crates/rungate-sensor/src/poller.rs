//! Poke-mode driver.
//!
//! Holds a check open and re-polls the gate every `poke_interval` until it
//! settles. Schedulers that release the worker between polls (reschedule
//! mode) call [`ReadinessGate::check`] themselves and persist the context.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{CheckContext, CheckOutcome, DependencySet, GateError, ReadinessGate};

/// Shortest sleep between polls, whatever the context asks for.
const MIN_POKE_INTERVAL: Duration = Duration::from_secs(1);

/// Wall-clock readings that only move forward.
///
/// Anchored to `Utc::now()` once and advanced by tokio's monotonic clock,
/// so a paused test runtime controls it too.
#[derive(Debug, Clone, Copy)]
struct MonotonicClock {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl MonotonicClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Drives a gate until a check settles.
pub struct Poller {
    gate: ReadinessGate,
}

impl Poller {
    /// Create a new Poller.
    pub fn new(gate: ReadinessGate) -> Self {
        Self { gate }
    }

    /// The gate being polled.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Poll `ctx` until it is `Ready` or `Failed`.
    ///
    /// A store, registry or schedule error ends the loop immediately.
    pub async fn run(&self, ctx: &mut CheckContext) -> Result<CheckOutcome, GateError> {
        let clock = MonotonicClock::start();
        info!(
            own_job = %ctx.own_job_id,
            target_job = %ctx.target_job_id,
            poke_interval_secs = ctx.poke_interval.as_secs(),
            timeout_secs = ctx.timeout.as_secs(),
            "Waiting for upstream dependency"
        );

        loop {
            let outcome = self.gate.check_at(ctx, clock.now()).await?;
            if outcome.is_terminal() {
                return Ok(outcome);
            }
            let sleep = ctx.poke_interval.max(MIN_POKE_INTERVAL);
            debug!(
                target_job = %ctx.target_job_id,
                sleep_secs = sleep.as_secs(),
                "Sleeping until next poke"
            );
            tokio::time::sleep(sleep).await;
        }
    }

    /// Poll every member of `set` until the set settles.
    pub async fn run_set(&self, set: &mut DependencySet) -> Result<CheckOutcome, GateError> {
        let clock = MonotonicClock::start();
        loop {
            let outcome = set.check_at(&self.gate, clock.now()).await?;
            if outcome.is_terminal() {
                return Ok(outcome);
            }
            let sleep = set
                .poke_interval()
                .unwrap_or(MIN_POKE_INTERVAL)
                .max(MIN_POKE_INTERVAL);
            debug!(sleep_secs = sleep.as_secs(), "Sleeping until next poke");
            tokio::time::sleep(sleep).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureReason, InMemoryJobRegistry, InMemoryRunHistory};
    use chrono::TimeZone;
    use rungate_core::{JobDefinition, JobId, JobRun, RunState, ScheduleSpec};
    use std::sync::Arc;

    fn ymd(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap()
    }

    fn upstream() -> JobDefinition {
        JobDefinition::new(
            "crossref_metadata",
            ScheduleSpec::parse("0 0 7 * *", Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap())
                .unwrap(),
        )
    }

    fn context() -> CheckContext {
        CheckContext::new(
            "doi_workflow",
            ScheduleSpec::parse("@weekly", ymd(4)).unwrap(),
            ymd(4),
            "crossref_metadata",
            Utc::now(),
        )
        .with_poke_interval(Duration::from_secs(20 * 60))
        .with_timeout(Duration::from_secs(60 * 60))
    }

    async fn gate() -> (ReadinessGate, Arc<InMemoryRunHistory>) {
        let registry = Arc::new(InMemoryJobRegistry::new());
        registry.register(upstream()).await;
        let history = Arc::new(InMemoryRunHistory::new());
        (ReadinessGate::new(registry, history.clone()), history)
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_timeout() {
        let (gate, _history) = gate().await;
        let poller = Poller::new(gate);
        let mut ctx = context();

        let outcome = poller.run(&mut ctx).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Failed(FailureReason::TimedOut));
        // Polls at 0, 20, 40 and 60 minutes.
        assert_eq!(ctx.state.polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_ready_when_upstream_succeeds() {
        let (gate, history) = gate().await;
        let poller = Poller::new(gate);
        let mut ctx = context();

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30 * 60)).await;
            let run = JobRun::scheduled(&upstream(), ymd(7))
                .unwrap()
                .with_state(RunState::Success);
            history.record(run).await.unwrap();
        });

        let outcome = poller.run(&mut ctx).await.unwrap();
        writer.await.unwrap();

        assert_eq!(outcome, CheckOutcome::Ready);
        assert_eq!(ctx.state.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poke_interval_still_sleeps() {
        let (gate, _history) = gate().await;
        let poller = Poller::new(gate);
        let mut ctx = context()
            .with_poke_interval(Duration::ZERO)
            .with_timeout(Duration::from_secs(10));

        let outcome = poller.run(&mut ctx).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Failed(FailureReason::TimedOut));
        // One poll per second from 0 to 10 seconds.
        assert_eq!(ctx.state.polls, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_set_settles() {
        let (gate, _history) = gate().await;
        let poller = Poller::new(gate);
        let config = crate::GateConfig {
            poke_interval_secs: 600,
            timeout_secs: 1800,
            existence_check: true,
        };
        let mut set = DependencySet::new(
            &config,
            "doi_workflow",
            ScheduleSpec::parse("@weekly", ymd(4)).unwrap(),
            ymd(4),
            [JobId::from("crossref_metadata")],
            Utc::now(),
        );

        let outcome = poller.run_set(&mut set).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Failed(FailureReason::TimedOut));
        assert_eq!(set.members()[0].state.polls, 4);
    }
}
