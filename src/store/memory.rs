//! In-process store backed by hash maps behind a single lock.

use crate::error::StoreError;
use crate::models::{
    Analysis, AnalysisId, Batch, BatchId, BatchStatus, NewAnalysis, NewReview, Review, ReviewId,
    SentimentDistribution,
};
use crate::store::{AnalysisRepository, BatchRepository, ReviewRepository, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    batches: HashMap<BatchId, Batch>,
    reviews: BTreeMap<ReviewId, Review>,
    analyses: BTreeMap<AnalysisId, Analysis>,
    analysis_by_review: HashMap<ReviewId, AnalysisId>,
    next_review_id: ReviewId,
    next_analysis_id: AnalysisId,
}

/// Thread-safe in-memory store. Writes are visible to subsequent reads immediately.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BatchRepository for MemoryStore {
    async fn save_batch(&self, batch: Batch) -> StoreResult<()> {
        self.write()?.batches.insert(batch.id, batch);
        Ok(())
    }

    async fn find_batch(&self, id: BatchId) -> StoreResult<Option<Batch>> {
        Ok(self.read()?.batches.get(&id).cloned())
    }

    async fn update_status(&self, id: BatchId, status: BatchStatus) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.batches.get_mut(&id) {
            Some(batch) => {
                batch.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self.read()?.batches.values().cloned().collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn save_reviews(
        &self,
        batch_id: BatchId,
        reviews: Vec<NewReview>,
    ) -> StoreResult<Vec<Review>> {
        let mut tables = self.write()?;

        if !tables.batches.contains_key(&batch_id) {
            return Err(StoreError::MissingBatch(batch_id));
        }

        let mut saved = Vec::with_capacity(reviews.len());
        for review in reviews {
            tables.next_review_id += 1;
            let stored = Review {
                id: tables.next_review_id,
                batch_id,
                product_name: review.product_name,
                review_text: review.review_text,
                reviewer_name: review.reviewer_name,
            };
            tables.reviews.insert(stored.id, stored.clone());
            saved.push(stored);
        }

        Ok(saved)
    }

    async fn find_reviews_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Review>> {
        Ok(self
            .read()?
            .reviews
            .values()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalysisRepository for MemoryStore {
    async fn save_analysis(&self, analysis: NewAnalysis) -> StoreResult<Analysis> {
        let mut tables = self.write()?;

        let batch_id = tables
            .reviews
            .get(&analysis.review_id)
            .map(|r| r.batch_id)
            .ok_or(StoreError::MissingReview(analysis.review_id))?;

        if tables.analysis_by_review.contains_key(&analysis.review_id) {
            return Err(StoreError::DuplicateAnalysis(analysis.review_id));
        }

        tables.next_analysis_id += 1;
        let stored = Analysis {
            id: tables.next_analysis_id,
            review_id: analysis.review_id,
            batch_id,
            sentiment: analysis.sentiment,
            confidence_score: analysis.confidence_score,
            summary: analysis.summary,
            pros: analysis.pros,
            cons: analysis.cons,
            created_at: Utc::now(),
        };

        tables.analysis_by_review.insert(stored.review_id, stored.id);
        tables.analyses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_analyses_by_batch(&self, batch_id: BatchId) -> StoreResult<Vec<Analysis>> {
        let mut analyses: Vec<Analysis> = self
            .read()?
            .analyses
            .values()
            .filter(|a| a.batch_id == batch_id)
            .cloned()
            .collect();
        analyses.sort_by_key(|a| a.review_id);
        Ok(analyses)
    }

    async fn count_by_sentiment(&self, batch_id: BatchId) -> StoreResult<SentimentDistribution> {
        let tables = self.read()?;
        Ok(crate::analysis::sentiment_distribution(
            tables.analyses.values().filter(|a| a.batch_id == batch_id),
        ))
    }

    async fn find_analysis_by_review(
        &self,
        review_id: ReviewId,
    ) -> StoreResult<Option<Analysis>> {
        let tables = self.read()?;
        Ok(tables
            .analysis_by_review
            .get(&review_id)
            .and_then(|id| tables.analyses.get(id))
            .cloned())
    }
}
