//! Output sink traits and the run summary
//!
//! The orchestrator writes records through `RecordSink` and, in debug mode, raw
//! pages through `SnapshotSink`. Both are append-only.

use crate::record::Record;
use crate::state::{MetricsSnapshot, TaskOutcome};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Accepts finished records one at a time
///
/// Sinks do not deduplicate; that is left to downstream consumers.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn push(&self, record: &Record) -> OutputResult<()>;

    /// Makes every pushed record durable
    async fn flush(&self) -> OutputResult<()> {
        Ok(())
    }
}

/// Accepts raw page snapshots keyed by task label and URL
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn save(&self, label: &str, url: &str, body: &str) -> OutputResult<()>;
}

/// Terminal summary of one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Effective target after capping
    pub target: usize,

    /// Effective worker count after clamping
    pub concurrency: usize,

    pub emitted: usize,

    /// Detail pages that failed after retries
    pub failed: usize,

    /// Detail pages dropped because the target was reached
    pub skipped_cap: usize,

    /// Detail pages with no business name
    pub unresolved: usize,

    pub tasks_total: usize,
    pub tasks_failed: usize,

    /// Outcome per task label, in task order
    pub task_outcomes: Vec<(String, TaskOutcome)>,

    pub duration: Duration,
    pub metrics: MetricsSnapshot,
}

impl RunSummary {
    /// Share of emitted records that carry an email, in percent
    pub fn email_rate(&self) -> f64 {
        let total = self.metrics.emails_found + self.metrics.emails_missing;
        if total == 0 {
            0.0
        } else {
            self.metrics.emails_found as f64 * 100.0 / total as f64
        }
    }

    /// Emitted records per minute of wall time
    pub fn records_per_minute(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            0.0
        } else {
            self.emitted as f64 / minutes
        }
    }

    /// True when every task failed and nothing was emitted
    pub fn all_tasks_failed(&self) -> bool {
        self.tasks_total > 0 && self.tasks_failed == self.tasks_total && self.emitted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureKind;

    #[test]
    fn test_email_rate() {
        let mut summary = RunSummary::default();
        assert_eq!(summary.email_rate(), 0.0);
        summary.metrics.emails_found = 3;
        summary.metrics.emails_missing = 1;
        assert_eq!(summary.email_rate(), 75.0);
    }

    #[test]
    fn test_records_per_minute() {
        let summary = RunSummary {
            emitted: 30,
            duration: Duration::from_secs(120),
            ..RunSummary::default()
        };
        assert_eq!(summary.records_per_minute(), 15.0);
    }

    #[test]
    fn test_all_tasks_failed() {
        let mut summary = RunSummary {
            tasks_total: 2,
            tasks_failed: 2,
            task_outcomes: vec![
                ("a".to_string(), TaskOutcome::Failed(FailureKind::Blocked)),
                ("b".to_string(), TaskOutcome::Failed(FailureKind::CaptchaUnsolved)),
            ],
            ..RunSummary::default()
        };
        assert!(summary.all_tasks_failed());
        summary.emitted = 1;
        assert!(!summary.all_tasks_failed());
        assert!(!RunSummary::default().all_tasks_failed());
    }
}
