//! In-memory run history and job registry.
//!
//! Reference implementations of the collaborator traits, used by the CLI
//! (loaded from a JSON snapshot) and by tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rungate_core::{CoreError, JobDefinition, JobId, JobRun, RunId, RunState};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{JobRegistry, RunHistoryStore, RunQuery};
use crate::StoreError;

/// Run history held in memory, indexed by RunId.
#[derive(Default)]
pub struct InMemoryRunHistory {
    runs: RwLock<HashMap<RunId, JobRun>>,
}

impl InMemoryRunHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new run.
    pub async fn record(&self, run: JobRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.run_id) {
            return Err(CoreError::DuplicateRun(run.run_id.to_string()).into());
        }
        debug!(
            job_id = %run.job_id,
            run_id = %run.run_id,
            logical_time = %run.logical_time,
            state = %run.state,
            "Recording run"
        );
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    /// Update the state of an existing run. Terminal runs cannot change.
    pub async fn set_state(&self, run_id: &RunId, state: RunState) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| CoreError::RunNotFound(run_id.to_string()))?;
        run.transition(state)?;
        debug!(run_id = %run_id, state = %state, "Run state updated");
        Ok(())
    }

    /// Get the number of recorded runs.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// All runs, ordered by job and logical time.
    pub async fn all_runs(&self) -> Vec<JobRun> {
        let mut runs: Vec<JobRun> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| (&a.job_id, a.logical_time).cmp(&(&b.job_id, b.logical_time)));
        runs
    }
}

#[async_trait]
impl RunHistoryStore for InMemoryRunHistory {
    async fn query_runs(&self, query: &RunQuery) -> Result<Vec<JobRun>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.values().filter(|run| query.matches(run)).cloned().collect())
    }
}

/// Job definitions held in memory, indexed by JobId.
#[derive(Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, JobDefinition>>,
}

impl InMemoryJobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a job definition.
    pub async fn register(&self, job: JobDefinition) {
        debug!(job_id = %job.job_id, cadence = %job.schedule.cadence, "Registering job");
        self.jobs.write().await.insert(job.job_id.clone(), job);
    }

    /// Look up a job definition.
    pub async fn get(&self, job_id: &JobId) -> Option<JobDefinition> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// All job definitions, ordered by id.
    pub async fn all_jobs(&self) -> Vec<JobDefinition> {
        let mut jobs: Vec<JobDefinition> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn exists(&self, job_id: &JobId) -> Result<bool, StoreError> {
        Ok(self.jobs.read().await.contains_key(job_id))
    }
}

/// Serializable dump of a registry and a run history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Registered jobs.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,

    /// Recorded runs.
    #[serde(default)]
    pub runs: Vec<JobRun>,
}

impl HistorySnapshot {
    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a snapshot from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            StoreError::Unavailable(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Write the snapshot to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await.map_err(|e| {
            StoreError::Unavailable(format!("failed to write '{}': {}", path.display(), e))
        })
    }

    /// Build in-memory stores holding the snapshot's contents.
    pub async fn into_stores(self) -> Result<(InMemoryJobRegistry, InMemoryRunHistory), StoreError> {
        let registry = InMemoryJobRegistry::new();
        for job in self.jobs {
            registry.register(job).await;
        }

        let history = InMemoryRunHistory::new();
        for run in self.runs {
            history.record(run).await?;
        }

        Ok((registry, history))
    }

    /// Capture the current contents of in-memory stores.
    pub async fn capture(registry: &InMemoryJobRegistry, history: &InMemoryRunHistory) -> Self {
        Self {
            jobs: registry.all_jobs().await,
            runs: history.all_runs().await,
        }
    }
}
