//! Upstream run matching.
//!
//! An upstream run counts for a downstream window when its *logical time*
//! falls inside the window. The upstream run's own responsibility interval
//! plays no part. Any one successful run is enough; failed and running runs
//! are ignored rather than treated as failures.

use std::sync::Arc;

use rungate_core::{DataInterval, JobId, RunState};
use tracing::debug;

use crate::store::{RunHistoryStore, RunQuery};
use crate::StoreError;

/// Decides whether run history holds a qualifying upstream run.
#[derive(Clone)]
pub struct RunMatcher {
    store: Arc<dyn RunHistoryStore>,
}

impl RunMatcher {
    /// Create a new RunMatcher.
    pub fn new(store: Arc<dyn RunHistoryStore>) -> Self {
        Self { store }
    }

    /// Whether `target` has at least one successful run with a logical time
    /// inside `interval`.
    pub async fn has_qualifying_run(
        &self,
        target: &JobId,
        interval: &DataInterval,
    ) -> Result<bool, StoreError> {
        let query = RunQuery::new(target.clone(), *interval);
        let runs = self.store.query_runs(&query).await?;

        // Count by state for diagnostics, and re-check what the store returned.
        let mut qualifying = 0usize;
        let mut failed = 0usize;
        let mut running = 0usize;
        for run in runs.iter().filter(|run| query.matches(run)) {
            if run.state.satisfies_dependency() {
                qualifying += 1;
            } else if run.state == RunState::Failed {
                failed += 1;
            } else {
                running += 1;
            }
        }

        debug!(
            target_job = %target,
            interval = %interval,
            qualifying,
            failed,
            running,
            "Queried upstream runs"
        );

        Ok(qualifying > 0)
    }
}
