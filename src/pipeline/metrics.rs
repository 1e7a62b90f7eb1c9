//! Counters for pipeline activity.
//!
//! Every failure the pipeline recovers from on its own is counted here so
//! that fail-soft paths stay visible.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, lock-free counters updated by the inference client and orchestrator.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    batches_created: AtomicU64,
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    analyses_stored: AtomicU64,
    inference_failures: AtomicU64,
    persistence_failures: AtomicU64,
    task_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub batches_created: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub analyses_stored: u64,
    pub inference_failures: u64,
    pub persistence_failures: u64,
    pub task_failures: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch_created(&self) {
        self.batches_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_completed(&self) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_stored(&self) {
        self.analyses_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// An inference call fell back to the degraded default.
    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An analysis write failed and the review was skipped.
    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A per-review task panicked or was cancelled.
    pub fn record_task_failure(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_created: self.batches_created.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            analyses_stored: self.analyses_stored.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Generate a one-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} analyses stored, {} inference fallbacks, {} skipped writes, {} failed tasks",
            self.analyses_stored,
            self.inference_failures,
            self.persistence_failures,
            self.task_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_analysis_stored();
        metrics.record_analysis_stored();
        metrics.record_inference_failure();
        metrics.record_batch_completed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.analyses_stored, 2);
        assert_eq!(snapshot.inference_failures, 1);
        assert_eq!(snapshot.batches_completed, 1);
        assert_eq!(snapshot.persistence_failures, 0);
        assert!(snapshot.summary().contains("2 analyses stored"));
    }
}
