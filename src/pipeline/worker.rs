//! Background worker that drains the batch queue.

use crate::models::BatchId;
use crate::pipeline::orchestrator::{BatchAnalyzer, BatchSummary};
use crate::store::Store;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

/// Lifecycle notifications published to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Queued { batch_id: BatchId, reviews: usize },
    Finished(BatchSummary),
    Failed { batch_id: BatchId, reason: String },
}

impl BatchEvent {
    pub fn batch_id(&self) -> BatchId {
        match self {
            BatchEvent::Queued { batch_id, .. } => *batch_id,
            BatchEvent::Finished(summary) => summary.batch_id,
            BatchEvent::Failed { batch_id, .. } => *batch_id,
        }
    }
}

/// Totals for a worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub batches_analyzed: usize,
    pub batches_rejected: usize,
}

/// Analyzes queued batches one at a time until the queue closes.
pub struct AnalysisWorker<S: Store> {
    analyzer: BatchAnalyzer<S>,
    queue: mpsc::Receiver<BatchId>,
    events: broadcast::Sender<BatchEvent>,
}

impl<S: Store> AnalysisWorker<S> {
    pub(crate) fn new(
        analyzer: BatchAnalyzer<S>,
        queue: mpsc::Receiver<BatchId>,
        events: broadcast::Sender<BatchEvent>,
    ) -> Self {
        Self {
            analyzer,
            queue,
            events,
        }
    }

    /// Run until every orchestrator handle is dropped and the queue is empty.
    pub async fn run(mut self) -> WorkerReport {
        info!("Analysis worker started");
        let mut report = WorkerReport::default();

        while let Some(batch_id) = self.queue.recv().await {
            let event = match self.analyzer.analyze_batch(batch_id).await {
                Ok(summary) => {
                    report.batches_analyzed += 1;
                    BatchEvent::Finished(summary)
                }
                Err(e) => {
                    error!("Analysis of batch {} failed: {}", batch_id, e);
                    report.batches_rejected += 1;
                    BatchEvent::Failed {
                        batch_id,
                        reason: e.to_string(),
                    }
                }
            };

            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        info!(
            "Analysis worker stopped ({} analyzed, {} rejected)",
            report.batches_analyzed, report.batches_rejected
        );
        report
    }
}
