//! RunGate Sensor Library
//!
//! This crate decides whether a downstream run may start based on an upstream
//! job's run history. One call to [`ReadinessGate::check`] is one poll: it
//! performs at most one registry lookup and one history query, then returns
//! `Ready`, `Pending` or `Failed(reason)`. Sleeping between polls is left to
//! the caller; [`Poller`] is a reference driver that does it with tokio.

pub mod config;
pub mod context;
pub mod error;
pub mod existence;
pub mod gate;
pub mod matcher;
pub mod memory;
pub mod metrics;
pub mod poller;
pub mod set;
pub mod store;

pub use config::{ConfigError, GateConfig};
pub use context::{CheckContext, CheckOutcome, FailureReason, PollState};
pub use error::{GateError, StoreError};
pub use existence::ExistenceValidator;
pub use gate::ReadinessGate;
pub use matcher::RunMatcher;
pub use memory::{HistorySnapshot, InMemoryJobRegistry, InMemoryRunHistory};
pub use metrics::GateMetrics;
pub use poller::Poller;
pub use set::DependencySet;
pub use store::{JobRegistry, RunHistoryStore, RunQuery};
