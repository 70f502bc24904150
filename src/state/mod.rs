//! State module for tracking run progress
//!
//! # Components
//!
//! - `FailureKind`: the failure taxonomy every error maps onto
//! - `TaskOutcome`: how a task's pagination ended
//! - `RunMetrics`: atomic counters shared by all workers

mod failure;
mod metrics;

// Re-export main types
pub use failure::{FailureKind, TaskOutcome};
pub use metrics::{MetricsSnapshot, RunMetrics};
