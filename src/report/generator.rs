//! Markdown report generation.
//!
//! This module renders a batch report as Markdown or JSON.

use crate::analysis::group_by_product;
use crate::models::{
    AnalyzedReview, BatchInsights, Report, ReportMetadata, Sentiment, SentimentDistribution, Theme,
};
use crate::pipeline::MetricsSnapshot;
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# ReviewPulse Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_verdict_section(&report.insights));
    output.push_str(&generate_distribution_section(&report.sentiment_distribution));
    output.push_str(&generate_themes_section(&report.insights));
    output.push_str(&generate_reviews_section(&report.reviews));
    output.push_str(&generate_metrics_section(&report.metrics));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Batch:** `{}`\n", metadata.batch_id));
    section.push_str(&format!("- **Source:** {}\n", metadata.source_name));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Status:** {}\n", metadata.status));
    section.push_str(&format!(
        "- **Reviews Analyzed:** {}/{}\n",
        metadata.analyzed, metadata.total_reviews
    ));
    if let Some(confidence) = metadata.average_confidence {
        section.push_str(&format!("- **Average Confidence:** {:.2}\n", confidence));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Verdict](#verdict)\n");
    toc.push_str("- [Sentiment Distribution](#sentiment-distribution)\n");
    toc.push_str("- [Top Themes](#top-themes)\n");

    if !report.reviews.is_empty() {
        toc.push_str("- [Reviews by Product](#reviews-by-product)\n");
    }

    toc.push_str("- [Pipeline Metrics](#pipeline-metrics)\n\n");

    toc
}

fn generate_verdict_section(insights: &BatchInsights) -> String {
    let mut section = String::new();

    section.push_str("## Verdict\n\n");

    if let Some(product) = &insights.product {
        section.push_str(&format!("*Filtered to product: {}*\n\n", product));
    }

    match insights.verdict {
        Some(verdict) => {
            section.push_str(&format!("### {} {}\n\n", verdict.emoji(), verdict));
            section.push_str(&format!(
                "{} of {} reviews are positive ({:.0}%).\n\n",
                insights.positive,
                insights.total,
                percentage(insights.positive as u64, insights.total as u64)
            ));
        }
        None => section.push_str("No analyzed reviews to judge yet.\n\n"),
    }

    if insights.products.len() > 1 {
        section.push_str(&format!("**Products:** {}\n\n", insights.products.join(", ")));
    }

    section
}

fn generate_distribution_section(distribution: &SentimentDistribution) -> String {
    let mut section = String::new();

    section.push_str("## Sentiment Distribution\n\n");

    let total: u64 = distribution.values().sum();
    let count = |s: Sentiment| distribution.get(&s).copied().unwrap_or(0);

    section.push_str("| Sentiment | Reviews | Share |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for sentiment in [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative] {
        let n = count(sentiment);
        section.push_str(&format!(
            "| {} | {} | {:.0}% |\n",
            sentiment,
            n,
            percentage(n, total)
        ));
    }
    section.push_str(&format!("| **Total** | **{}** | |\n\n", total));

    section
}

fn generate_themes_section(insights: &BatchInsights) -> String {
    let mut section = String::new();

    section.push_str("## Top Themes\n\n");
    section.push_str(&generate_theme_table("Pros", &insights.top_pros));
    section.push_str(&generate_theme_table("Cons", &insights.top_cons));

    section
}

fn generate_theme_table(title: &str, themes: &[Theme]) -> String {
    let mut table = format!("### {}\n\n", title);

    if themes.is_empty() {
        table.push_str("None mentioned.\n\n");
        return table;
    }

    table.push_str("| Theme | Mentions |\n");
    table.push_str("|:---|:---:|\n");
    for theme in themes {
        table.push_str(&format!("| {} | {} |\n", theme.name, theme.count));
    }
    table.push('\n');

    table
}

fn generate_reviews_section(reviews: &[AnalyzedReview]) -> String {
    if reviews.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Reviews by Product\n\n");

    for (product, reviews) in group_by_product(reviews) {
        section.push_str(&format!("### {} ({} reviews)\n\n", product, reviews.len()));
        for review in &reviews {
            section.push_str(&generate_review_block(review));
        }
    }

    section
}

fn generate_review_block(item: &AnalyzedReview) -> String {
    let mut block = String::new();
    let analysis = &item.analysis;

    let badge = match analysis.sentiment {
        Sentiment::Positive => "🟢 **POSITIVE**",
        Sentiment::Neutral => "🟡 **NEUTRAL**",
        Sentiment::Negative => "🔴 **NEGATIVE**",
    };

    block.push_str(&format!("#### {} {}\n\n", badge, item.review.reviewer_name));
    block.push_str(&format!("> {}\n\n", item.review.review_text.replace('\n', "\n> ")));

    if !analysis.summary.is_empty() {
        block.push_str(&format!("**Summary:** {}\n\n", analysis.summary));
    }
    if let Some(score) = analysis.confidence_score {
        block.push_str(&format!("**Confidence:** {:.2}\n\n", score));
    }
    if !analysis.pros.is_empty() {
        block.push_str(&format!("**Pros:** {}\n\n", analysis.pros.join("; ")));
    }
    if !analysis.cons.is_empty() {
        block.push_str(&format!("**Cons:** {}\n\n", analysis.cons.join("; ")));
    }

    block.push_str("---\n\n");

    block
}

fn generate_metrics_section(metrics: &MetricsSnapshot) -> String {
    let mut section = String::new();

    section.push_str("## Pipeline Metrics\n\n");
    section.push_str("| Counter | Value |\n");
    section.push_str("|:---|:---:|\n");
    for (name, value) in [
        ("Analyses stored", metrics.analyses_stored),
        ("Inference failures", metrics.inference_failures),
        ("Persistence failures", metrics.persistence_failures),
        ("Task failures", metrics.task_failures),
    ] {
        section.push_str(&format!("| {} | {} |\n", name, value));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by ReviewPulse*\n".to_string()
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Analysis, BatchStatus, Review, Verdict};
    use chrono::Utc;
    use uuid::Uuid;

    fn analyzed(id: u64, product: &str, sentiment: Sentiment) -> AnalyzedReview {
        let batch_id = Uuid::nil();
        AnalyzedReview {
            review: Review {
                id,
                batch_id,
                product_name: product.to_string(),
                review_text: format!("Review {}", id),
                reviewer_name: "Sam".to_string(),
            },
            analysis: Analysis {
                id,
                review_id: id,
                batch_id,
                sentiment,
                confidence_score: Some(0.75),
                summary: "Short summary".to_string(),
                pros: vec!["sturdy".to_string()],
                cons: vec![],
                created_at: Utc::now(),
            },
        }
    }

    fn create_test_report() -> Report {
        let reviews = vec![
            analyzed(1, "Desk", Sentiment::Positive),
            analyzed(2, "Chair", Sentiment::Negative),
        ];

        Report {
            metadata: ReportMetadata {
                batch_id: Uuid::nil(),
                source_name: "furniture.csv".to_string(),
                analysis_date: Utc::now(),
                model_used: "test-model".to_string(),
                status: BatchStatus::Completed,
                total_reviews: 2,
                analyzed: 2,
                average_confidence: Some(0.75),
                duration_seconds: 1.5,
            },
            sentiment_distribution: [(Sentiment::Positive, 1), (Sentiment::Negative, 1)]
                .into_iter()
                .collect(),
            insights: crate::analysis::build_insights(&reviews, None, 5),
            reviews,
            metrics: MetricsSnapshot {
                analyses_stored: 2,
                ..MetricsSnapshot::default()
            },
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# ReviewPulse Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("furniture.csv"));
        assert!(markdown.contains("COMPLETED"));
        assert!(markdown.contains("## Sentiment Distribution"));
        assert!(markdown.contains("| Positive | 1 | 50% |"));
        assert!(markdown.contains("### Chair (1 reviews)"));
        assert!(markdown.contains("| sturdy | 2 |"));
    }

    #[test]
    fn test_verdict_section() {
        let report = create_test_report();
        let section = generate_verdict_section(&report.insights);

        assert_eq!(report.insights.verdict, Some(Verdict::MixedFeedback));
        assert!(section.contains("Mixed Feedback"));
        assert!(section.contains("1 of 2 reviews are positive (50%)"));
    }

    #[test]
    fn test_empty_batch_sections() {
        let insights = crate::analysis::build_insights(&[], None, 5);
        let verdict = generate_verdict_section(&insights);
        assert!(verdict.contains("No analyzed reviews"));

        let dist = generate_distribution_section(&SentimentDistribution::new());
        assert!(dist.contains("| Positive | 0 | 0% |"));

        assert!(generate_reviews_section(&[]).is_empty());
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"sentiment_distribution\""));
        assert!(json.contains("\"Positive\": 1"));
        assert!(json.contains("\"COMPLETED\""));
        assert!(json.contains("\"top_pros\""));
    }
}
