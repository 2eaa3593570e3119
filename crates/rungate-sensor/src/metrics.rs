//! Gate metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CheckOutcome, FailureReason};

/// Counters shared by every check a gate performs.
#[derive(Debug, Default)]
pub struct GateMetrics {
    polls: AtomicU64,
    replays: AtomicU64,
    ready: AtomicU64,
    pending: AtomicU64,
    target_not_found: AtomicU64,
    timed_out: AtomicU64,
    errors: AtomicU64,
}

impl GateMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a poll that reached a decision.
    pub fn record_outcome(&self, outcome: CheckOutcome) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CheckOutcome::Ready => &self.ready,
            CheckOutcome::Pending => &self.pending,
            CheckOutcome::Failed(FailureReason::TargetNotFound) => &self.target_not_found,
            CheckOutcome::Failed(FailureReason::TimedOut) => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a poll answered from an already-terminal context.
    pub fn record_replay(&self) {
        self.replays.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a poll aborted by a collaborator or schedule error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of decided polls so far.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Format all counters as Prometheus text.
    pub fn render(&self) -> String {
        let mut output = String::new();

        writeln!(output, "# HELP rungate_polls_total Gate polls that reached a decision").ok();
        writeln!(output, "# TYPE rungate_polls_total counter").ok();
        writeln!(output, "rungate_polls_total {}", self.polls.load(Ordering::Relaxed)).ok();

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP rungate_outcomes_total Gate outcomes by kind"
        )
        .ok();
        writeln!(output, "# TYPE rungate_outcomes_total counter").ok();
        for (label, counter) in [
            ("ready", &self.ready),
            ("pending", &self.pending),
            ("target_not_found", &self.target_not_found),
            ("timed_out", &self.timed_out),
        ] {
            writeln!(
                output,
                "rungate_outcomes_total{{outcome=\"{label}\"}} {}",
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP rungate_replays_total Polls answered from a recorded terminal outcome"
        )
        .ok();
        writeln!(output, "# TYPE rungate_replays_total counter").ok();
        writeln!(output, "rungate_replays_total {}", self.replays.load(Ordering::Relaxed)).ok();

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP rungate_errors_total Polls aborted by store, registry or schedule errors"
        )
        .ok();
        writeln!(output, "# TYPE rungate_errors_total counter").ok();
        writeln!(output, "rungate_errors_total {}", self.errors.load(Ordering::Relaxed)).ok();

        output
    }
}
