//! RunGate Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Run-history storage
//! - Async runtime specifics
//! - Logging or metrics sinks
//!
//! Everything needed to decide *which* upstream runs a downstream run may
//! depend on lives here: job and run identifiers, run states, schedules and
//! the responsibility-interval calculation.

pub mod error;
pub mod ids;
pub mod interval;
pub mod run;
pub mod schedule;
pub mod status;

// Re-export commonly used types
pub use error::{CoreError, ScheduleError};
pub use ids::{JobId, RunId};
pub use interval::DataInterval;
pub use run::{JobDefinition, JobRun};
pub use schedule::{compute_interval, Cadence, ScheduleSpec};
pub use status::RunState;
