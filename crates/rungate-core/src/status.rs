//! Run state enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Completion state of a job run as recorded in run history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Run is executing (or queued); its result is not known yet.
    #[default]
    Running,
    /// Run completed successfully.
    Success,
    /// Run failed.
    Failed,
}

impl RunState {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns true if a run in this state satisfies a downstream dependency.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check whether a run may move from `self` to `next`.
    ///
    /// Terminal states are final; a running run may finish either way.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match self {
            Self::Running => true,
            Self::Success | Self::Failed => *self == next,
        }
    }

    /// Lowercase name, as used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_satisfies() {
        assert!(RunState::Success.satisfies_dependency());
        assert!(!RunState::Failed.satisfies_dependency());
        assert!(!RunState::Running.satisfies_dependency());
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(RunState::Running.can_transition_to(RunState::Success));
        assert!(RunState::Running.can_transition_to(RunState::Failed));
        assert!(!RunState::Success.can_transition_to(RunState::Failed));
        assert!(!RunState::Failed.can_transition_to(RunState::Running));
        assert!(RunState::Success.can_transition_to(RunState::Success));
    }
}
