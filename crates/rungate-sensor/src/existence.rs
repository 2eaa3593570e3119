//! Target-job existence check.

use std::sync::Arc;

use rungate_core::JobId;
use tracing::debug;

use crate::store::JobRegistry;
use crate::StoreError;

/// Looks up job definitions (not run history) in the registry.
#[derive(Clone)]
pub struct ExistenceValidator {
    registry: Arc<dyn JobRegistry>,
}

impl ExistenceValidator {
    /// Create a new ExistenceValidator.
    pub fn new(registry: Arc<dyn JobRegistry>) -> Self {
        Self { registry }
    }

    /// Whether `target` is a registered job.
    pub async fn exists(&self, target: &JobId) -> Result<bool, StoreError> {
        let found = self.registry.exists(target).await?;
        debug!(target_job = %target, found, "Checked target job registration");
        Ok(found)
    }
}
