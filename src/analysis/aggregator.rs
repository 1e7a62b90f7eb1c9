//! Analysis aggregation and statistics.
//!
//! This module turns loosely structured model output into validated
//! analysis records and computes the per-batch statistics shown in reports.

use crate::models::{
    Analysis, AnalyzedReview, BatchInsights, NewAnalysis, RawAnalysis, Review, Sentiment,
    SentimentDistribution, Theme, Verdict,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Number of pros/cons themes kept by default.
pub const DEFAULT_TOP_THEMES: usize = 5;

/// Build an analysis record for `review` from a raw inference result.
///
/// Each field falls back to its default independently, so a partially
/// malformed payload still yields a record.
pub fn to_analysis(review: &Review, raw: &RawAnalysis) -> NewAnalysis {
    let payload = &raw.payload;

    NewAnalysis {
        review_id: review.id,
        sentiment: parse_sentiment(payload.get("sentiment")),
        confidence_score: parse_confidence(payload.get("confidence_score")),
        summary: payload
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        pros: parse_string_list(payload.get("pros")),
        cons: parse_string_list(payload.get("cons")),
    }
}

fn parse_sentiment(value: Option<&Value>) -> Sentiment {
    value
        .and_then(Value::as_str)
        .and_then(Sentiment::parse)
        .unwrap_or_default()
}

/// Numeric scores are clamped into [0.0, 1.0]; anything else is absent.
fn parse_confidence(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|score| score.is_finite())
        .map(|score| score.clamp(0.0, 1.0))
}

fn parse_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// Count analyses per sentiment. Labels with no analyses are omitted.
pub fn sentiment_distribution<'a>(
    analyses: impl IntoIterator<Item = &'a Analysis>,
) -> SentimentDistribution {
    let mut dist = SentimentDistribution::new();

    for analysis in analyses {
        *dist.entry(analysis.sentiment).or_default() += 1;
    }

    dist
}

/// Rank themes by mention count, highest first, ties alphabetical.
pub fn top_themes<'a>(mentions: impl IntoIterator<Item = &'a String>, n: usize) -> Vec<Theme> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for mention in mentions {
        *counts.entry(mention.as_str()).or_default() += 1;
    }

    let mut themes: Vec<Theme> = counts
        .into_iter()
        .map(|(name, count)| Theme {
            name: name.to_string(),
            count,
        })
        .collect();

    themes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    themes.truncate(n);
    themes
}

/// Judge a set of reviews by the share that is positive.
pub fn verdict(positive: usize, total: usize) -> Option<Verdict> {
    if total == 0 {
        return None;
    }

    let ratio = positive as f64 / total as f64;
    let verdict = if ratio >= 0.8 {
        Verdict::HighlyRecommended
    } else if ratio >= 0.6 {
        Verdict::GenerallyPositive
    } else if ratio >= 0.4 {
        Verdict::MixedFeedback
    } else {
        Verdict::NotRecommended
    };

    Some(verdict)
}

/// Compute insights over analyzed reviews, optionally for one product only.
pub fn build_insights(
    reviews: &[AnalyzedReview],
    product: Option<&str>,
    top_n: usize,
) -> BatchInsights {
    let products: Vec<String> = reviews
        .iter()
        .map(|r| r.review.product_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let selected: Vec<&AnalyzedReview> = reviews
        .iter()
        .filter(|r| product.map_or(true, |p| r.review.product_name == p))
        .collect();

    let dist = sentiment_distribution(selected.iter().copied().map(|r| &r.analysis));
    let count = |sentiment: Sentiment| dist.get(&sentiment).copied().unwrap_or(0) as usize;
    let positive = count(Sentiment::Positive);

    BatchInsights {
        product: product.map(String::from),
        total: selected.len(),
        positive,
        negative: count(Sentiment::Negative),
        neutral: count(Sentiment::Neutral),
        verdict: verdict(positive, selected.len()),
        top_pros: top_themes(selected.iter().copied().flat_map(|r| &r.analysis.pros), top_n),
        top_cons: top_themes(selected.iter().copied().flat_map(|r| &r.analysis.cons), top_n),
        products,
    }
}

/// Group analyzed reviews by product name.
pub fn group_by_product(reviews: &[AnalyzedReview]) -> BTreeMap<String, Vec<AnalyzedReview>> {
    let mut grouped: BTreeMap<String, Vec<AnalyzedReview>> = BTreeMap::new();

    for review in reviews {
        grouped
            .entry(review.review.product_name.clone())
            .or_default()
            .push(review.clone());
    }

    grouped
}

/// Mean confidence over the analyses that carry a score.
pub fn average_confidence<'a>(analyses: impl IntoIterator<Item = &'a Analysis>) -> Option<f64> {
    let scores: Vec<f64> = analyses
        .into_iter()
        .filter_map(|a| a.confidence_score)
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
