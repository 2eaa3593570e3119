//! Several upstream dependencies for one downstream run.

use chrono::{DateTime, Utc};
use rungate_core::{JobId, ScheduleSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{CheckContext, CheckOutcome, ConfigError, GateConfig, GateError, ReadinessGate};

/// One check context per upstream job, all gating the same downstream run.
///
/// Members are polled in declaration order. The set is `Ready` when every
/// member is, `Failed` as soon as any member fails, and `Pending` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    members: Vec<CheckContext>,
}

impl DependencySet {
    /// Build one context per target from shared settings.
    pub fn new(
        config: &GateConfig,
        own_job_id: impl Into<JobId>,
        own_schedule: ScheduleSpec,
        own_logical_time: DateTime<Utc>,
        targets: impl IntoIterator<Item = JobId>,
        now: DateTime<Utc>,
    ) -> Self {
        let own_job_id = own_job_id.into();
        let members = targets
            .into_iter()
            .map(|target| {
                CheckContext::from_config(
                    config,
                    own_job_id.clone(),
                    own_schedule.clone(),
                    own_logical_time,
                    target,
                    now,
                )
            })
            .collect();
        Self { members }
    }

    /// Build a set from existing contexts.
    pub fn from_contexts(members: Vec<CheckContext>) -> Self {
        Self { members }
    }

    /// The member contexts.
    pub fn members(&self) -> &[CheckContext] {
        &self.members
    }

    /// Aggregate of the members' recorded outcomes, without polling.
    pub fn outcome(&self) -> CheckOutcome {
        let mut all_ready = true;
        for member in &self.members {
            match member.terminal_outcome() {
                Some(failed @ CheckOutcome::Failed(_)) => return failed,
                Some(CheckOutcome::Ready) => {}
                _ => all_ready = false,
            }
        }
        if all_ready {
            CheckOutcome::Ready
        } else {
            CheckOutcome::Pending
        }
    }

    /// Check every member for settings that cannot be polled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.members.iter().try_for_each(CheckContext::validate)
    }

    /// Poll every unsettled member once at `now` and return the aggregate.
    ///
    /// Polling stops at the first failure; members after it are not queried.
    /// If a member's poll errors, members polled before it keep their
    /// updated state, so callers should persist the set on error too.
    pub async fn check_at(
        &mut self,
        gate: &ReadinessGate,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, GateError> {
        let settled = self.outcome();
        if settled.is_terminal() {
            return Ok(settled);
        }

        for member in &mut self.members {
            if let CheckOutcome::Failed(reason) = gate.check_at(member, now).await? {
                info!(
                    own_job = %member.own_job_id,
                    target_job = %member.target_job_id,
                    reason = %reason,
                    "Dependency set failed"
                );
                break;
            }
        }

        Ok(self.outcome())
    }

    /// Poll at the current wall-clock time.
    pub async fn check(&mut self, gate: &ReadinessGate) -> Result<CheckOutcome, GateError> {
        self.check_at(gate, Utc::now()).await
    }

    /// Shortest poke interval among unsettled members.
    pub fn poke_interval(&self) -> Option<std::time::Duration> {
        self.members
            .iter()
            .filter(|member| member.terminal_outcome().is_none())
            .map(|member| member.poke_interval)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RunHistoryStore, RunQuery};
    use crate::{FailureReason, InMemoryJobRegistry, InMemoryRunHistory, StoreError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rungate_core::{JobDefinition, JobRun, RunState};
    use std::sync::Arc;
    use std::time::Duration;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, 0, 0).unwrap()
    }

    fn job(id: &str, expr: &str) -> JobDefinition {
        let start = Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap();
        JobDefinition::new(id, ScheduleSpec::parse(expr, start).unwrap())
    }

    async fn setup() -> (Arc<InMemoryJobRegistry>, Arc<InMemoryRunHistory>, ReadinessGate) {
        let registry = Arc::new(InMemoryJobRegistry::new());
        registry.register(job("crossref_metadata", "0 0 7 * *")).await;
        registry.register(job("openalex", "@weekly")).await;
        let history = Arc::new(InMemoryRunHistory::new());
        let gate = ReadinessGate::new(registry.clone(), history.clone());
        (registry, history, gate)
    }

    fn weekly_set(targets: &[&str], config: &GateConfig) -> DependencySet {
        DependencySet::new(
            config,
            "doi_workflow",
            ScheduleSpec::parse("@weekly", at(4, 0)).unwrap(),
            at(4, 0),
            targets.iter().map(|t| JobId::from(*t)),
            at(11, 0),
        )
    }

    #[tokio::test]
    async fn test_ready_only_when_all_members_ready() {
        let (_registry, history, gate) = setup().await;
        let mut set = weekly_set(&["crossref_metadata", "openalex"], &GateConfig::default());

        history
            .record(
                JobRun::scheduled(&job("crossref_metadata", "0 0 7 * *"), at(7, 0))
                    .unwrap()
                    .with_state(RunState::Success),
            )
            .await
            .unwrap();
        assert_eq!(set.check_at(&gate, at(11, 0)).await.unwrap(), CheckOutcome::Pending);
        assert_eq!(set.members()[0].terminal_outcome(), Some(CheckOutcome::Ready));

        history
            .record(
                JobRun::scheduled(&job("openalex", "@weekly"), at(4, 0))
                    .unwrap()
                    .with_state(RunState::Success),
            )
            .await
            .unwrap();
        assert_eq!(set.check_at(&gate, at(11, 1)).await.unwrap(), CheckOutcome::Ready);
        assert_eq!(set.poke_interval(), None);
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let (_registry, _history, gate) = setup().await;
        let config = GateConfig {
            existence_check: true,
            ..GateConfig::default()
        };
        let mut set = weekly_set(&["crossref_metadata", "orcid", "openalex"], &config);

        let outcome = set.check_at(&gate, at(11, 0)).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Failed(FailureReason::TargetNotFound));
        // Polling stopped at the failing member.
        assert_eq!(set.members()[2].state.polls, 0);

        // Settled sets are not polled again.
        assert_eq!(set.check_at(&gate, at(12, 0)).await.unwrap(), outcome);
        assert_eq!(set.members()[0].state.polls, 1);
    }

    /// History that refuses queries for one job.
    struct PartlyDownHistory {
        inner: Arc<InMemoryRunHistory>,
        down: JobId,
    }

    #[async_trait]
    impl RunHistoryStore for PartlyDownHistory {
        async fn query_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError> {
            if query.job_id == self.down {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.query_runs(query).await
        }
    }

    #[tokio::test]
    async fn test_error_keeps_progress_of_earlier_members() {
        let (registry, history, _gate) = setup().await;
        history
            .record(
                JobRun::scheduled(&job("crossref_metadata", "0 0 7 * *"), at(7, 0))
                    .unwrap()
                    .with_state(RunState::Success),
            )
            .await
            .unwrap();
        let gate = ReadinessGate::new(
            registry,
            Arc::new(PartlyDownHistory {
                inner: history,
                down: JobId::from("openalex"),
            }),
        );
        let mut set = weekly_set(&["crossref_metadata", "openalex"], &GateConfig::default());

        let err = set.check_at(&gate, at(11, 0)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(set.members()[0].terminal_outcome(), Some(CheckOutcome::Ready));
        assert_eq!(set.members()[0].state.polls, 1);
        assert_eq!(set.members()[1].state.polls, 0);

        // The persisted form carries the settled member forward.
        let json = serde_json::to_string(&set).unwrap();
        let restored: DependencySet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.members()[0].terminal_outcome(), Some(CheckOutcome::Ready));
    }

    #[test]
    fn test_validate_rejects_zero_poke_interval() {
        let mut set = weekly_set(&["crossref_metadata", "openalex"], &GateConfig::default());
        assert!(set.validate().is_ok());
        set.members[1].poke_interval = Duration::ZERO;
        assert!(matches!(set.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_set_is_ready() {
        let set = DependencySet::from_contexts(Vec::new());
        assert_eq!(set.outcome(), CheckOutcome::Ready);
    }

    #[test]
    fn test_poke_interval_is_minimum_of_members() {
        let config = GateConfig::default();
        let mut set = weekly_set(&["crossref_metadata", "openalex"], &config);
        set.members[1].poke_interval = Duration::from_secs(60);
        assert_eq!(set.poke_interval(), Some(Duration::from_secs(60)));
    }
}
