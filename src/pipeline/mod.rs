//! Batch pipeline: creation, queueing and concurrent analysis.

pub mod metrics;
pub mod orchestrator;
pub mod worker;

pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use orchestrator::{BatchAnalyzer, BatchOrchestrator, BatchSummary, PipelineConfig, ReviewOutcome};
pub use worker::{AnalysisWorker, BatchEvent, WorkerReport};
