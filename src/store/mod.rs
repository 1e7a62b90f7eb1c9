//! Persistence boundary for batches, reviews and analyses.
//!
//! The pipeline only talks to these traits. [`MemoryStore`] is the
//! in-process implementation used by the CLI and the tests.

pub mod memory;

use crate::error::StoreError;
use crate::models::{
    Analysis, Batch, BatchId, BatchStatus, NewAnalysis, NewReview, Review, ReviewId,
    SentimentDistribution,
};
use async_trait::async_trait;

pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage of batch records.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Insert or replace a batch.
    async fn save_batch(&self, batch: Batch) -> StoreResult<()>;

    async fn find_batch(&self, id: BatchId) -> StoreResult<Option<Batch>>;

    /// Set the status of an existing batch. Returns `false` if it does not exist.
    async fn update_status(&self, id: BatchId, status: BatchStatus) -> StoreResult<bool>;

    /// All batches, newest first.
    async fn list_batches(&self) -> StoreResult<Vec<Batch>>;
}

/// Storage of review records.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Persist reviews for an existing batch, all or nothing.
    async fn save_reviews(&self, batch_id: BatchId, reviews: Vec<NewReview>)
        -> StoreResult<Vec<Review>>;

    /// Reviews of a batch ordered by id.
    async fn find_reviews_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Review>>;
}

/// Storage of analysis records.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Persist an analysis. Fails if the review already has one.
    async fn save_analysis(&self, analysis: NewAnalysis) -> StoreResult<Analysis>;

    /// Analyses of a batch ordered by review id.
    async fn find_analyses_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Analysis>>;

    async fn count_by_sentiment(&self, batch_id: BatchId) -> StoreResult<SentimentDistribution>;

    async fn find_analysis_by_review(&self, review_id: ReviewId)
        -> StoreResult<Option<Analysis>>;
}

/// Everything the pipeline needs from a backend.
pub trait Store: BatchRepository + ReviewRepository + AnalysisRepository + 'static {}

impl<T> Store for T where T: BatchRepository + ReviewRepository + AnalysisRepository + 'static {}
