//! Error types for the ingestion and analysis pipeline.

use crate::models::{BatchId, BatchStatus, ReviewId};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the orchestrator and status provider.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Upload content was empty or malformed
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    /// Requested batch does not exist
    #[error("Batch not found: {0}")]
    NotFound(BatchId),

    /// Storage layer error
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Analysis requested for a batch that is not processing
    #[error("Batch {batch_id} is not eligible for analysis (status {status})")]
    NotEligible {
        batch_id: BatchId,
        status: BatchStatus,
    },

    /// Another analysis run holds the batch
    #[error("Batch {0} is already being analyzed")]
    AlreadyRunning(BatchId),

    /// The analysis worker is gone
    #[error("Analysis queue closed before batch {0} could be scheduled")]
    QueueClosed(BatchId),

    /// Too many batches are waiting for analysis
    #[error("Analysis queue is full; batch {0} was not scheduled")]
    QueueFull(BatchId),
}

/// Errors reported by repository implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reviews must reference an existing batch
    #[error("Batch {0} does not exist")]
    MissingBatch(BatchId),

    /// Analyses must reference an existing review
    #[error("Review {0} does not exist")]
    MissingReview(ReviewId),

    /// At most one analysis per review
    #[error("Review {0} already has an analysis")]
    DuplicateAnalysis(ReviewId),

    /// Backend failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failures of a single inference call. Never escapes the inference client.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("No API key configured")]
    MissingCredentials,

    #[error("Review text is empty")]
    EmptyInput,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Inference API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
