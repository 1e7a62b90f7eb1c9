//! Data models for the review pipeline.
//!
//! This module contains the batch, review and analysis records that flow
//! between ingestion, inference and the status queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::pipeline::MetricsSnapshot;

/// Identifier of an upload batch.
pub type BatchId = Uuid;

/// Store-assigned identifier of a review.
pub type ReviewId = u64;

/// Store-assigned identifier of an analysis.
pub type AnalysisId = u64;

/// Reviewer label used when the upload has no reviewer column.
pub const ANONYMOUS_REVIEWER: &str = "Anonymous";

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Declared for completeness; creation goes straight to `Processing`.
    #[allow(dead_code)]
    Pending,
    /// Reviews are stored and analysis is queued or running.
    Processing,
    /// Every scheduled review analysis has resolved.
    Completed,
    /// Ingestion broke after the batch record was written.
    Failed,
}

impl BatchStatus {
    /// Whether the batch will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "PENDING"),
            BatchStatus::Processing => write!(f, "PROCESSING"),
            BatchStatus::Completed => write!(f, "COMPLETED"),
            BatchStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A single upload's unit of tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier generated at creation.
    pub id: BatchId,
    /// Name of the uploaded file.
    pub source_name: String,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: BatchStatus,
}

impl Batch {
    /// Creates a fresh batch in the `Processing` state.
    pub fn start(source_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            created_at: Utc::now(),
            status: BatchStatus::Processing,
        }
    }
}

/// A decoded upload row, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub product_name: String,
    pub review_text: String,
    pub reviewer_name: String,
}

/// A persisted review. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    /// Owning batch.
    pub batch_id: BatchId,
    pub product_name: String,
    pub review_text: String,
    pub reviewer_name: String,
}

/// Sentiment label assigned to a review.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Recognizes one of the three labels, ignoring case and surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "Positive"),
            Sentiment::Negative => write!(f, "Negative"),
            Sentiment::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Loosely structured result returned by the inference client.
///
/// The payload is whatever JSON the model produced; the aggregator is
/// responsible for turning it into a validated [`NewAnalysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnalysis {
    pub payload: Value,
    /// Set when the payload is the degraded default rather than a model answer.
    pub fallback: bool,
}

impl RawAnalysis {
    /// Wraps a payload returned by the model.
    pub fn from_model(payload: Value) -> Self {
        Self {
            payload,
            fallback: false,
        }
    }

    /// The degraded default used whenever inference fails.
    pub fn degraded() -> Self {
        Self {
            payload: json!({
                "sentiment": "Neutral",
                "summary": "Analysis Failed",
                "pros": [],
                "cons": [],
            }),
            fallback: true,
        }
    }
}

/// A validated analysis ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub review_id: ReviewId,
    pub sentiment: Sentiment,
    /// Always within [0.0, 1.0] when present.
    pub confidence_score: Option<f64>,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// A persisted analysis. Created at most once per review, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub review_id: ReviewId,
    /// Batch of the analyzed review, kept for grouping queries.
    pub batch_id: BatchId,
    pub sentiment: Sentiment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// An analysis joined with the review it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedReview {
    pub review: Review,
    pub analysis: Analysis,
}

/// Count of analyses per sentiment label.
pub type SentimentDistribution = BTreeMap<Sentiment, u64>;

/// Status and sentiment distribution of a batch, read together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub status: BatchStatus,
    pub sentiment_distribution: SentimentDistribution,
}

/// How far analysis of a batch has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub total_reviews: usize,
    pub analyzed: usize,
}

/// A pro or con mentioned across reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub count: usize,
}

/// Overall recommendation derived from the share of positive reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    HighlyRecommended,
    GenerallyPositive,
    MixedFeedback,
    NotRecommended,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::HighlyRecommended => write!(f, "Highly Recommended"),
            Verdict::GenerallyPositive => write!(f, "Generally Positive"),
            Verdict::MixedFeedback => write!(f, "Mixed Feedback"),
            Verdict::NotRecommended => write!(f, "Not Recommended"),
        }
    }
}

impl Verdict {
    /// Returns an emoji representation of the verdict.
    pub fn emoji(&self) -> &'static str {
        match self {
            Verdict::HighlyRecommended => "🟢",
            Verdict::GenerallyPositive => "🔵",
            Verdict::MixedFeedback => "🟡",
            Verdict::NotRecommended => "🔴",
        }
    }
}

/// Summary insights over the analyzed reviews of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInsights {
    /// Product the insights were restricted to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    /// `None` when there is nothing to judge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub top_pros: Vec<Theme>,
    pub top_cons: Vec<Theme>,
    /// Distinct products in the batch, sorted.
    pub products: Vec<String>,
}

/// Metadata about a batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub batch_id: BatchId,
    pub source_name: String,
    pub analysis_date: DateTime<Utc>,
    pub model_used: String,
    pub status: BatchStatus,
    pub total_reviews: usize,
    pub analyzed: usize,
    /// Mean confidence over analyses that carry a score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
    pub duration_seconds: f64,
}

/// Complete report for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub sentiment_distribution: SentimentDistribution,
    pub insights: BatchInsights,
    /// Empty when the report omits individual reviews.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviews: Vec<AnalyzedReview>,
    pub metrics: MetricsSnapshot,
}
