//! Batch lifecycle: ingestion, scheduling and concurrent analysis.
//!
//! `create_batch` persists a batch and its reviews and hands the batch id to
//! the [`AnalysisWorker`] queue. The worker runs `analyze_batch`, which fans
//! out one task per review, waits for all of them, then marks the batch
//! `COMPLETED`.

use crate::analysis;
use crate::error::{PipelineError, Result};
use crate::inference::InferenceClient;
use crate::ingest;
use crate::models::{Batch, BatchId, BatchStatus, Review, ANONYMOUS_REVIEWER};
use crate::pipeline::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::worker::{AnalysisWorker, BatchEvent};
use crate::store::Store;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Settings for the orchestrator and its worker.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum review analyses in flight per batch.
    pub concurrency: usize,
    /// Batches that may wait for the worker; beyond that `create_batch` is refused.
    pub queue_capacity: usize,
    /// Reviewer label for rows without one.
    pub default_reviewer: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            queue_capacity: 16,
            default_reviewer: ANONYMOUS_REVIEWER.to_string(),
        }
    }
}

/// Terminal outcome of one review's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Model answer stored.
    Stored,
    /// Degraded default stored after an inference failure.
    Degraded,
    /// The analysis write failed; the review has no analysis.
    Skipped,
    /// The review task panicked.
    Crashed,
}

/// Result of one `analyze_batch` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total_reviews: usize,
    pub stored: usize,
    pub degraded: usize,
    pub skipped: usize,
    pub crashed: usize,
    /// Whether the batch still existed when it was marked completed.
    pub status_updated: bool,
    pub duration_seconds: f64,
}

impl BatchSummary {
    fn from_outcomes(batch_id: BatchId, outcomes: &[ReviewOutcome]) -> Self {
        let count = |wanted: ReviewOutcome| outcomes.iter().filter(|o| **o == wanted).count();

        Self {
            batch_id,
            total_reviews: outcomes.len(),
            stored: count(ReviewOutcome::Stored),
            degraded: count(ReviewOutcome::Degraded),
            skipped: count(ReviewOutcome::Skipped),
            crashed: count(ReviewOutcome::Crashed),
            status_updated: false,
            duration_seconds: 0.0,
        }
    }

    /// Analyses written during the run, degraded ones included.
    pub fn analyses_written(&self) -> usize {
        self.stored + self.degraded
    }
}

/// Runs analysis for one batch at a time per call. Cheap to clone.
pub struct BatchAnalyzer<S: Store> {
    store: Arc<S>,
    client: InferenceClient,
    metrics: Arc<PipelineMetrics>,
    concurrency: usize,
    running: Arc<Mutex<HashSet<BatchId>>>,
}

impl<S: Store> Clone for BatchAnalyzer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            client: self.client.clone(),
            metrics: self.metrics.clone(),
            concurrency: self.concurrency,
            running: self.running.clone(),
        }
    }
}

/// Releases a batch claim when the run ends, however it ends.
struct RunClaim {
    running: Arc<Mutex<HashSet<BatchId>>>,
    batch_id: BatchId,
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.batch_id);
    }
}

impl<S: Store> BatchAnalyzer<S> {
    fn new(
        store: Arc<S>,
        client: InferenceClient,
        metrics: Arc<PipelineMetrics>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            client,
            metrics,
            concurrency: concurrency.max(1),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn claim(&self, batch_id: BatchId) -> Result<RunClaim> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(batch_id) {
            return Err(PipelineError::AlreadyRunning(batch_id));
        }

        Ok(RunClaim {
            running: self.running.clone(),
            batch_id,
        })
    }

    /// Analyze every review of a `PROCESSING` batch, then mark it `COMPLETED`.
    ///
    /// Per-review failures are contained: they are logged, counted and
    /// reported in the summary, but never abort sibling reviews or the
    /// final status transition. A store failure after the batch was found
    /// eligible marks it `FAILED` so it never stays `PROCESSING`.
    pub async fn analyze_batch(&self, batch_id: BatchId) -> Result<BatchSummary> {
        let _claim = self.claim(batch_id)?;

        let batch = self
            .store
            .find_batch(batch_id)
            .await?
            .ok_or(PipelineError::NotFound(batch_id))?;

        if batch.status != BatchStatus::Processing {
            return Err(PipelineError::NotEligible {
                batch_id,
                status: batch.status,
            });
        }

        match self.run_eligible(batch_id).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("Analysis run for batch {} aborted: {}", batch_id, e);
                self.fail_batch(batch_id).await;
                Err(e)
            }
        }
    }

    async fn run_eligible(&self, batch_id: BatchId) -> Result<BatchSummary> {
        let reviews = self.store.find_reviews_by_batch(batch_id).await?;
        info!(
            "Started analysis for batch {} ({} reviews)",
            batch_id,
            reviews.len()
        );

        let start_time = Instant::now();

        let outcomes: Vec<ReviewOutcome> = stream::iter(reviews)
            .map(|review| {
                let analyzer = self.clone();
                tokio::spawn(async move { analyzer.analyze_review(review).await })
            })
            .buffer_unordered(self.concurrency)
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!("Review task in batch {} crashed: {}", batch_id, e);
                    self.metrics.record_task_failure();
                    ReviewOutcome::Crashed
                })
            })
            .collect()
            .await;

        let mut summary = BatchSummary::from_outcomes(batch_id, &outcomes);
        summary.duration_seconds = start_time.elapsed().as_secs_f64();

        summary.status_updated = self
            .store
            .update_status(batch_id, BatchStatus::Completed)
            .await?;

        if summary.status_updated {
            self.metrics.record_batch_completed();
            info!(
                "Batch {} analysis completed: {} stored, {} degraded, {} skipped in {:.1}s",
                batch_id, summary.stored, summary.degraded, summary.skipped, summary.duration_seconds
            );
        } else {
            warn!(
                "Batch {} disappeared during analysis; status update skipped",
                batch_id
            );
        }

        Ok(summary)
    }

    pub(crate) async fn fail_batch(&self, batch_id: BatchId) {
        match self.store.update_status(batch_id, BatchStatus::Failed).await {
            Ok(_) => {
                self.metrics.record_batch_failed();
                warn!("Batch {} marked FAILED", batch_id);
            }
            Err(e) => error!("Could not mark batch {} FAILED: {}", batch_id, e),
        }
    }

    async fn analyze_review(&self, review: Review) -> ReviewOutcome {
        let raw = self.client.analyze(&review.review_text).await;
        let record = analysis::to_analysis(&review, &raw);

        match self.store.save_analysis(record).await {
            Ok(stored) => {
                debug!("Stored analysis {} for review {}", stored.id, review.id);
                self.metrics.record_analysis_stored();
                if raw.fallback {
                    ReviewOutcome::Degraded
                } else {
                    ReviewOutcome::Stored
                }
            }
            Err(e) => {
                warn!("Error storing analysis for review {}: {}", review.id, e);
                self.metrics.record_persistence_failure();
                ReviewOutcome::Skipped
            }
        }
    }
}

/// Owns the batch lifecycle and hands batches to the analysis worker.
pub struct BatchOrchestrator<S: Store> {
    store: Arc<S>,
    analyzer: BatchAnalyzer<S>,
    queue: mpsc::Sender<BatchId>,
    events: broadcast::Sender<BatchEvent>,
    metrics: Arc<PipelineMetrics>,
    default_reviewer: String,
}

impl<S: Store> BatchOrchestrator<S> {
    /// Create an orchestrator and the worker that consumes its queue.
    ///
    /// The worker must be spawned by the caller; it stops once the
    /// orchestrator is dropped and the queue drains.
    pub fn new(
        store: Arc<S>,
        client: InferenceClient,
        metrics: Arc<PipelineMetrics>,
        config: PipelineConfig,
    ) -> (Self, AnalysisWorker<S>) {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (events, _) = broadcast::channel(64);
        let analyzer = BatchAnalyzer::new(store.clone(), client, metrics.clone(), config.concurrency);

        let worker = AnalysisWorker::new(analyzer.clone(), receiver, events.clone());
        let orchestrator = Self {
            store,
            analyzer,
            queue,
            events,
            metrics,
            default_reviewer: config.default_reviewer,
        };

        (orchestrator, worker)
    }

    /// Decode an uploaded CSV and create a batch from it.
    pub async fn upload(&self, source_name: &str, bytes: &[u8]) -> Result<BatchId> {
        let rows = ingest::decode_rows(bytes)?;
        self.create_batch(source_name, rows).await
    }

    /// Persist a batch and its reviews, then queue it for analysis.
    ///
    /// The first row is a header and is skipped. Returns as soon as the
    /// batch is queued without waiting on the worker; a full queue fails
    /// the batch with [`PipelineError::QueueFull`].
    pub async fn create_batch(&self, source_name: &str, rows: Vec<Vec<String>>) -> Result<BatchId> {
        let reviews = ingest::rows_to_reviews(&rows, &self.default_reviewer)?;
        let review_count = reviews.len();

        let batch = Batch::start(source_name);
        let batch_id = batch.id;

        self.store.save_batch(batch).await.map_err(|e| {
            PipelineError::Ingestion(format!("Failed to persist batch: {}", e))
        })?;
        self.metrics.record_batch_created();

        if let Err(e) = self.store.save_reviews(batch_id, reviews).await {
            self.fail_batch(batch_id).await;
            return Err(PipelineError::Ingestion(format!(
                "Failed to persist reviews for batch {}: {}",
                batch_id, e
            )));
        }

        if let Err(e) = self.queue.try_send(batch_id) {
            self.fail_batch(batch_id).await;
            return Err(match e {
                TrySendError::Full(_) => PipelineError::QueueFull(batch_id),
                TrySendError::Closed(_) => PipelineError::QueueClosed(batch_id),
            });
        }

        info!(
            "Created batch {} from {} with {} reviews",
            batch_id, source_name, review_count
        );
        let _ = self.events.send(BatchEvent::Queued {
            batch_id,
            reviews: review_count,
        });

        Ok(batch_id)
    }

    /// Run analysis of a batch on the calling task.
    #[allow(dead_code)] // The CLI schedules through the worker queue
    pub async fn analyze_batch(&self, batch_id: BatchId) -> Result<BatchSummary> {
        self.analyzer.analyze_batch(batch_id).await
    }

    /// Receive lifecycle events published by the orchestrator and worker.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    #[allow(dead_code)] // Convenience accessor
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn fail_batch(&self, batch_id: BatchId) {
        self.analyzer.fail_batch(batch_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InferenceError, StoreError};
    use crate::inference::InferenceTransport;
    use crate::models::{
        Analysis, NewAnalysis, NewReview, ReviewId, Sentiment, SentimentDistribution,
    };
    use crate::store::{
        AnalysisRepository, BatchRepository, MemoryStore, ReviewRepository, StoreResult,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_test::assert_ok;

    /// Answers every review positively after a short delay, tracking overlap.
    #[derive(Default)]
    struct PositiveTransport {
        delay_ms: u64,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InferenceTransport for PositiveTransport {
        async fn complete(&self, review_text: &str) -> std::result::Result<Value, InferenceError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            Ok(json!({
                "sentiment": "Positive",
                "confidence_score": 0.9,
                "summary": format!("About {}", review_text),
                "pros": ["quality"],
                "cons": [],
            }))
        }
    }

    struct DownTransport;

    #[async_trait]
    impl InferenceTransport for DownTransport {
        async fn complete(&self, _review_text: &str) -> std::result::Result<Value, InferenceError> {
            Err(InferenceError::Api {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    /// Blocks until released so a run can be held open.
    #[derive(Default)]
    struct GatedTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl InferenceTransport for GatedTransport {
        async fn complete(&self, _review_text: &str) -> std::result::Result<Value, InferenceError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(json!({"sentiment": "Neutral"}))
        }
    }

    /// Panics for one review text.
    struct PanickyTransport;

    #[async_trait]
    impl InferenceTransport for PanickyTransport {
        async fn complete(&self, review_text: &str) -> std::result::Result<Value, InferenceError> {
            if review_text == "boom" {
                panic!("transport bug");
            }
            Ok(json!({"sentiment": "Negative"}))
        }
    }

    /// Memory store with injectable failures that records how many
    /// analyses existed when the batch was marked completed.
    #[derive(Default)]
    struct ObservedStore {
        inner: MemoryStore,
        fail_reviews: bool,
        fail_review_reads: bool,
        fail_analysis_for: HashSet<ReviewId>,
        analyses_at_completion: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl BatchRepository for ObservedStore {
        async fn save_batch(&self, batch: Batch) -> StoreResult<()> {
            self.inner.save_batch(batch).await
        }

        async fn find_batch(&self, id: BatchId) -> StoreResult<Option<Batch>> {
            self.inner.find_batch(id).await
        }

        async fn update_status(&self, id: BatchId, status: BatchStatus) -> StoreResult<bool> {
            if status == BatchStatus::Completed {
                let count = self.inner.find_analyses_by_batch(id).await?.len();
                *self.analyses_at_completion.lock().unwrap() = Some(count);
            }
            self.inner.update_status(id, status).await
        }

        async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
            self.inner.list_batches().await
        }
    }

    #[async_trait]
    impl ReviewRepository for ObservedStore {
        async fn save_reviews(
            &self,
            batch_id: BatchId,
            reviews: Vec<NewReview>,
        ) -> StoreResult<Vec<Review>> {
            if self.fail_reviews {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.save_reviews(batch_id, reviews).await
        }

        async fn find_reviews_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Review>> {
            if self.fail_review_reads {
                return Err(StoreError::Unavailable("read timed out".to_string()));
            }
            self.inner.find_reviews_by_batch(batch_id).await
        }
    }

    #[async_trait]
    impl AnalysisRepository for ObservedStore {
        async fn save_analysis(&self, analysis: NewAnalysis) -> StoreResult<Analysis> {
            if self.fail_analysis_for.contains(&analysis.review_id) {
                return Err(StoreError::Unavailable("write rejected".to_string()));
            }
            self.inner.save_analysis(analysis).await
        }

        async fn find_analyses_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Analysis>> {
            self.inner.find_analyses_by_batch(batch_id).await
        }

        async fn count_by_sentiment(
            &self,
            batch_id: BatchId,
        ) -> StoreResult<SentimentDistribution> {
            self.inner.count_by_sentiment(batch_id).await
        }

        async fn find_analysis_by_review(
            &self,
            review_id: ReviewId,
        ) -> StoreResult<Option<Analysis>> {
            self.inner.find_analysis_by_review(review_id).await
        }
    }

    fn rows(n: usize) -> Vec<Vec<String>> {
        let mut rows = vec![vec![
            "id".to_string(),
            "product".to_string(),
            "review".to_string(),
            "reviewer".to_string(),
        ]];
        for i in 0..n {
            rows.push(vec![
                i.to_string(),
                format!("Product {}", i % 3),
                format!("Review number {}", i),
                format!("user{}", i),
            ]);
        }
        rows
    }

    fn orchestrator<S: Store>(
        store: Arc<S>,
        transport: Arc<dyn InferenceTransport>,
        concurrency: usize,
    ) -> (BatchOrchestrator<S>, AnalysisWorker<S>) {
        let config = PipelineConfig {
            concurrency,
            ..PipelineConfig::default()
        };
        with_config(store, transport, config)
    }

    fn with_config<S: Store>(
        store: Arc<S>,
        transport: Arc<dyn InferenceTransport>,
        config: PipelineConfig,
    ) -> (BatchOrchestrator<S>, AnalysisWorker<S>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let client = InferenceClient::new(transport, Duration::from_secs(5), metrics.clone());
        BatchOrchestrator::new(store, client, metrics, config)
    }

    #[tokio::test]
    async fn test_create_batch_persists_reviews_and_returns_immediately() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let batch_id = orch.create_batch("reviews.csv", rows(5)).await.unwrap();

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(batch.source_name, "reviews.csv");

        let reviews = store.find_reviews_by_batch(batch_id).await.unwrap();
        assert_eq!(reviews.len(), 5);
        assert!(reviews.iter().all(|r| r.batch_id == batch_id));
        assert_eq!(reviews[0].review_text, "Review number 0");

        // Worker not running: nothing analyzed yet.
        assert!(store.find_analyses_by_batch(batch_id).await.unwrap().is_empty());
        assert_eq!(orch.metrics().batches_created, 1);
    }

    #[tokio::test]
    async fn test_create_batch_rejects_header_only_upload() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let err = orch.create_batch("empty.csv", rows(0)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Ingestion(_)));
        assert!(store.list_batches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_persistence_failure_marks_batch_failed() {
        let store = Arc::new(ObservedStore {
            fail_reviews: true,
            ..ObservedStore::default()
        });
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let err = orch.create_batch("reviews.csv", rows(3)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));

        let batches = store.list_batches().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].status, BatchStatus::Failed);
        assert_eq!(orch.metrics().batches_failed, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_marks_batch_failed() {
        let store = Arc::new(MemoryStore::new());
        let (orch, worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);
        drop(worker);

        let err = orch.create_batch("reviews.csv", rows(2)).await.unwrap_err();
        let PipelineError::QueueClosed(batch_id) = err else {
            panic!("expected QueueClosed, got {err:?}");
        };

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_full_queue_refuses_without_blocking() {
        let store = Arc::new(MemoryStore::new());
        let config = PipelineConfig {
            queue_capacity: 1,
            ..PipelineConfig::default()
        };
        let transport = Arc::new(PositiveTransport::default());
        let (orch, _worker) = with_config(store.clone(), transport, config);

        let first = orch.create_batch("first.csv", rows(1)).await.unwrap();

        let second = tokio::time::timeout(
            Duration::from_secs(1),
            orch.create_batch("second.csv", rows(1)),
        )
        .await
        .expect("create_batch blocked on a full queue");
        let PipelineError::QueueFull(batch_id) = second.unwrap_err() else {
            panic!("expected QueueFull");
        };

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(
            store.find_batch(first).await.unwrap().unwrap().status,
            BatchStatus::Processing
        );
        assert_eq!(orch.metrics().batches_failed, 1);
    }

    #[tokio::test]
    async fn test_review_read_failure_marks_batch_failed() {
        let store = Arc::new(ObservedStore {
            fail_review_reads: true,
            ..ObservedStore::default()
        });
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let batch_id = orch.create_batch("reviews.csv", rows(3)).await.unwrap();
        let err = orch.analyze_batch(batch_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(StoreError::Unavailable(_))));

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(orch.metrics().batches_failed, 1);

        // The claim is released and the batch is now terminal.
        let again = orch.analyze_batch(batch_id).await.unwrap_err();
        assert!(matches!(
            again,
            PipelineError::NotEligible {
                status: BatchStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_worker_run_aborted_by_store_ends_terminal() {
        let store = Arc::new(ObservedStore {
            fail_review_reads: true,
            ..ObservedStore::default()
        });
        let (orch, worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);
        let mut events = orch.subscribe();

        let batch_id = orch.create_batch("reviews.csv", rows(2)).await.unwrap();
        let handle = tokio::spawn(worker.run());
        drop(orch);

        let report = handle.await.unwrap();
        assert_eq!(report.batches_rejected, 1);

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert!(batch.status.is_terminal());
        assert_eq!(batch.status, BatchStatus::Failed);

        let mut failed_for = None;
        while let Ok(event) = events.try_recv() {
            if let BatchEvent::Failed { batch_id: id, .. } = event {
                failed_for = Some(id);
            }
        }
        assert_eq!(failed_for, Some(batch_id));
    }

    #[tokio::test]
    async fn test_fifty_reviews_complete_before_status_flips() {
        let store = Arc::new(ObservedStore::default());
        let transport = Arc::new(PositiveTransport {
            delay_ms: 10,
            ..PositiveTransport::default()
        });
        let (orch, _worker) = orchestrator(store.clone(), transport.clone(), 8);

        let batch_id = orch.create_batch("big.csv", rows(50)).await.unwrap();
        let summary = orch.analyze_batch(batch_id).await.unwrap();

        assert_eq!(summary.total_reviews, 50);
        assert_eq!(summary.stored, 50);
        assert!(summary.status_updated);
        assert_eq!(*store.analyses_at_completion.lock().unwrap(), Some(50));

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);

        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "reviews were not analyzed concurrently");
        assert!(peak <= 8, "concurrency bound exceeded: {peak}");
    }

    #[tokio::test]
    async fn test_persistence_failures_skip_reviews_only() {
        let store = Arc::new(ObservedStore {
            fail_analysis_for: [2, 4].into_iter().collect(),
            ..ObservedStore::default()
        });
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let batch_id = orch.create_batch("reviews.csv", rows(6)).await.unwrap();
        let summary = orch.analyze_batch(batch_id).await.unwrap();

        assert_eq!(summary.stored, 4);
        assert_eq!(summary.skipped, 2);
        assert_eq!(store.find_analyses_by_batch(batch_id).await.unwrap().len(), 4);
        assert_eq!(
            store.find_batch(batch_id).await.unwrap().unwrap().status,
            BatchStatus::Completed
        );
        assert_eq!(orch.metrics().persistence_failures, 2);
    }

    #[tokio::test]
    async fn test_total_inference_failure_still_completes() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(DownTransport), 4);

        let batch_id = orch.create_batch("reviews.csv", rows(3)).await.unwrap();
        let summary = orch.analyze_batch(batch_id).await.unwrap();

        assert_eq!(summary.degraded, 3);
        let analyses = store.find_analyses_by_batch(batch_id).await.unwrap();
        assert!(analyses
            .iter()
            .all(|a| a.sentiment == Sentiment::Neutral && a.summary == "Analysis Failed"));
        assert_eq!(
            store.find_batch(batch_id).await.unwrap().unwrap().status,
            BatchStatus::Completed
        );
        assert_eq!(orch.metrics().inference_failures, 3);
    }

    #[tokio::test]
    async fn test_crashing_review_task_is_contained() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PanickyTransport), 4);

        let mut upload = rows(0);
        for (i, text) in ["fine", "boom", "also fine"].iter().enumerate() {
            upload.push(vec![i.to_string(), "Kettle".to_string(), text.to_string()]);
        }

        let batch_id = orch.create_batch("reviews.csv", upload).await.unwrap();
        let summary = orch.analyze_batch(batch_id).await.unwrap();

        assert_eq!(summary.stored, 2);
        assert_eq!(summary.crashed, 1);
        assert_eq!(orch.metrics().task_failures, 1);
        assert_eq!(
            store.find_batch(batch_id).await.unwrap().unwrap().status,
            BatchStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_completed_batch_is_not_reanalyzed() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let batch_id = orch.create_batch("reviews.csv", rows(2)).await.unwrap();
        assert_ok!(orch.analyze_batch(batch_id).await);

        let err = orch.analyze_batch(batch_id).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotEligible {
                status: BatchStatus::Completed,
                ..
            }
        ));
        assert_eq!(store.find_analyses_by_batch(batch_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(GatedTransport::default());
        let (orch, _worker) = orchestrator(store.clone(), transport.clone(), 1);
        let orch = Arc::new(orch);

        let batch_id = orch.create_batch("reviews.csv", rows(1)).await.unwrap();

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.analyze_batch(batch_id).await })
        };
        transport.entered.notified().await;

        let err = orch.analyze_batch(batch_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning(id) if id == batch_id));

        transport.release.notify_one();
        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.stored, 1);
    }

    #[tokio::test]
    async fn test_unknown_batch_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store, Arc::new(PositiveTransport::default()), 4);

        let missing = Batch::start("ghost").id;
        let err = orch.analyze_batch(missing).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_upload_decodes_csv() {
        let store = Arc::new(MemoryStore::new());
        let (orch, _worker) = orchestrator(store.clone(), Arc::new(PositiveTransport::default()), 4);

        let csv = "id,product,review\n1,Desk,\"Sturdy, easy to build\"\n2,Chair,Wobbly\n";
        let batch_id = orch.upload("furniture.csv", csv.as_bytes()).await.unwrap();

        let reviews = store.find_reviews_by_batch(batch_id).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].review_text, "Sturdy, easy to build");
        assert_eq!(reviews[1].reviewer_name, ANONYMOUS_REVIEWER);
    }
}
