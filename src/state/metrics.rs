//! Run-wide counters shared by every worker
//!
//! All counters are atomics so that workers can record events without
//! coordinating. `snapshot` produces the plain values used in the run summary.
use crate::record::FieldSource;
use crate::state::FailureKind;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Shared counters for one run
#[derive(Debug, Default)]
pub struct RunMetrics {
    structured_hits: AtomicU64,
    dom_hits: AtomicU64,
    schema_ai_hits: AtomicU64,
    llm_fallbacks: AtomicU64,
    emails_found: AtomicU64,
    emails_missing: AtomicU64,
    soft_blocks: AtomicU64,
    captcha_challenges: AtomicU64,
    identity_rotations: AtomicU64,
    pages_fetched: AtomicU64,
    failures: Mutex<BTreeMap<FailureKind, u64>>,
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub structured_hits: u64,
    pub dom_hits: u64,
    pub schema_ai_hits: u64,
    pub llm_fallbacks: u64,
    pub emails_found: u64,
    pub emails_missing: u64,
    pub soft_blocks: u64,
    pub captcha_challenges: u64,
    pub identity_rotations: u64,
    pub pages_fetched: u64,
    pub failures: BTreeMap<FailureKind, u64>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an extraction strategy contributed at least one field
    pub fn record_strategy_hit(&self, source: FieldSource) {
        let counter = match source {
            FieldSource::StructuredMarkup => &self.structured_hits,
            FieldSource::Dom => &self.dom_hits,
            FieldSource::SchemaAi => &self.schema_ai_hits,
            FieldSource::Llm => &self.llm_fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_email(&self, found: bool) {
        if found {
            self.emails_found.fetch_add(1, Ordering::Relaxed);
        } else {
            self.emails_missing.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_soft_block(&self) {
        self.soft_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_captcha(&self) {
        self.captcha_challenges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.identity_rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *failures.entry(kind).or_insert(0) += 1;
    }

    /// Number of failures recorded for one kind
    pub fn failure_count(&self, kind: FailureKind) -> u64 {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        failures.get(&kind).copied().unwrap_or(0)
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        let failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        MetricsSnapshot {
            structured_hits: self.structured_hits.load(Ordering::Relaxed),
            dom_hits: self.dom_hits.load(Ordering::Relaxed),
            schema_ai_hits: self.schema_ai_hits.load(Ordering::Relaxed),
            llm_fallbacks: self.llm_fallbacks.load(Ordering::Relaxed),
            emails_found: self.emails_found.load(Ordering::Relaxed),
            emails_missing: self.emails_missing.load(Ordering::Relaxed),
            soft_blocks: self.soft_blocks.load(Ordering::Relaxed),
            captcha_challenges: self.captcha_challenges.load(Ordering::Relaxed),
            identity_rotations: self.identity_rotations.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_strategy_hits_are_counted_per_source() {
        let metrics = RunMetrics::new();
        metrics.record_strategy_hit(FieldSource::StructuredMarkup);
        metrics.record_strategy_hit(FieldSource::StructuredMarkup);
        metrics.record_strategy_hit(FieldSource::Llm);

        let snap = metrics.snapshot();
        assert_eq!(snap.structured_hits, 2);
        assert_eq!(snap.llm_fallbacks, 1);
        assert_eq!(snap.dom_hits, 0);
    }

    #[test]
    fn test_failures_by_kind() {
        let metrics = RunMetrics::new();
        metrics.record_failure(FailureKind::Blocked);
        metrics.record_failure(FailureKind::Blocked);
        metrics.record_failure(FailureKind::CaptchaUnsolved);

        assert_eq!(metrics.failure_count(FailureKind::Blocked), 2);
        assert_eq!(metrics.failure_count(FailureKind::TransientNetwork), 0);
        assert_eq!(metrics.snapshot().failures.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let metrics = Arc::new(RunMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    m.record_page();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(metrics.snapshot().pages_fetched, 800);
    }
}
