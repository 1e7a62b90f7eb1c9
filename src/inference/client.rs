//! Fail-soft inference client.
//!
//! Wraps an [`InferenceTransport`] so that a single bad call can never abort
//! a batch: any failure, including a timeout, turns into
//! [`RawAnalysis::degraded`].

use crate::error::InferenceError;
use crate::inference::openai::InferenceTransport;
use crate::models::RawAnalysis;
use crate::pipeline::metrics::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Inference client shared by all per-review tasks.
#[derive(Clone)]
pub struct InferenceClient {
    transport: Arc<dyn InferenceTransport>,
    timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl InferenceClient {
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            transport,
            timeout,
            metrics,
        }
    }

    /// Analyze one review. Never fails.
    pub async fn analyze(&self, review_text: &str) -> RawAnalysis {
        match self.try_analyze(review_text).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Inference failed, using degraded result: {}", e);
                self.metrics.record_inference_failure();
                RawAnalysis::degraded()
            }
        }
    }

    async fn try_analyze(&self, review_text: &str) -> Result<RawAnalysis, InferenceError> {
        if review_text.trim().is_empty() {
            return Err(InferenceError::EmptyInput);
        }

        let payload = tokio::time::timeout(self.timeout, self.transport.complete(review_text))
            .await
            .map_err(|_| InferenceError::Timeout(self.timeout))??;

        debug!("Inference succeeded");
        Ok(RawAnalysis::from_model(payload))
    }
}
