//! Read-side queries over batches and their analyses.

use crate::analysis;
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalyzedReview, Batch, BatchId, BatchInsights, BatchProgress, BatchStatus, DashboardStats,
    SentimentDistribution,
};
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers status and statistics queries. Reads never block analysis.
pub struct StatusProvider<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for StatusProvider<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> StatusProvider<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn batch(&self, batch_id: BatchId) -> Result<Batch> {
        self.store
            .find_batch(batch_id)
            .await?
            .ok_or(PipelineError::NotFound(batch_id))
    }

    /// Current lifecycle status of a batch.
    pub async fn get_status(&self, batch_id: BatchId) -> Result<BatchStatus> {
        Ok(self.batch(batch_id).await?.status)
    }

    /// Analyses per sentiment label stored so far for a batch.
    ///
    /// May be partial while the batch is `PROCESSING`. Labels with no
    /// analyses are absent.
    pub async fn get_sentiment_distribution(
        &self,
        batch_id: BatchId,
    ) -> Result<SentimentDistribution> {
        self.batch(batch_id).await?;
        Ok(self.store.count_by_sentiment(batch_id).await?)
    }

    /// Status and distribution together.
    pub async fn get_dashboard(&self, batch_id: BatchId) -> Result<DashboardStats> {
        let status = self.get_status(batch_id).await?;
        let sentiment_distribution = self.get_sentiment_distribution(batch_id).await?;

        Ok(DashboardStats {
            status,
            sentiment_distribution,
        })
    }

    /// Analyzed reviews of a batch ordered by review id.
    ///
    /// Reviews without an analysis are left out.
    pub async fn get_analyses(&self, batch_id: BatchId) -> Result<Vec<AnalyzedReview>> {
        self.batch(batch_id).await?;

        let mut reviews: HashMap<_, _> = self
            .store
            .find_reviews_by_batch(batch_id)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let analyses = self.store.find_analyses_by_batch(batch_id).await?;

        Ok(analyses
            .into_iter()
            .filter_map(|analysis| {
                reviews
                    .remove(&analysis.review_id)
                    .map(|review| AnalyzedReview { review, analysis })
            })
            .collect())
    }

    /// Verdict and top themes, optionally restricted to one product.
    pub async fn get_insights(
        &self,
        batch_id: BatchId,
        product: Option<&str>,
        top_n: usize,
    ) -> Result<BatchInsights> {
        let analyzed = self.get_analyses(batch_id).await?;
        Ok(analysis::build_insights(&analyzed, product, top_n))
    }

    pub async fn get_progress(&self, batch_id: BatchId) -> Result<BatchProgress> {
        let batch = self.batch(batch_id).await?;
        let total_reviews = self.store.find_reviews_by_batch(batch_id).await?.len();
        let analyzed = self.store.find_analyses_by_batch(batch_id).await?.len();

        Ok(BatchProgress {
            status: batch.status,
            total_reviews,
            analyzed,
        })
    }

    /// Every known batch, newest first.
    #[allow(dead_code)] // Upload timeline for multi-batch frontends
    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        Ok(self.store.list_batches().await?)
    }
}
