//! CSV upload decoding.
//!
//! Columns are positional: index 1 is the product name, index 2 the review
//! text and index 3 the optional reviewer name. Index 0 is typically a row
//! number and is ignored. The first row is always a header.

use crate::error::{PipelineError, Result};
use crate::models::NewReview;
use tracing::debug;

/// Column holding the product name.
pub const PRODUCT_COLUMN: usize = 1;
/// Column holding the review body.
pub const TEXT_COLUMN: usize = 2;
/// Optional column holding the reviewer name.
pub const REVIEWER_COLUMN: usize = 3;

/// Decode raw upload bytes into rows of string fields.
///
/// Rows may have differing lengths; blank lines are skipped.
pub fn decode_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::Ingestion(format!("Invalid CSV at row {}: {}", index + 1, e))
        })?;
        rows.push(record.iter().map(String::from).collect());
    }

    debug!("Decoded {} CSV rows", rows.len());
    Ok(rows)
}

/// Map decoded rows to reviews, skipping the header row.
///
/// Fails if no data rows remain or any data row lacks the text column, so a
/// bad upload is rejected before anything is persisted.
pub fn rows_to_reviews(rows: &[Vec<String>], default_reviewer: &str) -> Result<Vec<NewReview>> {
    let data_rows = rows.get(1..).unwrap_or_default();

    if data_rows.is_empty() {
        return Err(PipelineError::Ingestion(
            "Upload contains no review rows after the header".to_string(),
        ));
    }

    data_rows
        .iter()
        .enumerate()
        .map(|(index, row)| row_to_review(row, default_reviewer, index + 2))
        .collect()
}

fn row_to_review(row: &[String], default_reviewer: &str, line: usize) -> Result<NewReview> {
    if row.len() <= TEXT_COLUMN {
        return Err(PipelineError::Ingestion(format!(
            "Row {} has {} columns, expected at least {}",
            line,
            row.len(),
            TEXT_COLUMN + 1
        )));
    }

    // A blank reviewer cell counts as absent.
    let reviewer_name = row
        .get(REVIEWER_COLUMN)
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(default_reviewer)
        .to_string();

    Ok(NewReview {
        product_name: row[PRODUCT_COLUMN].clone(),
        review_text: row[TEXT_COLUMN].clone(),
        reviewer_name,
    })
}

/// Decode an upload and map it to reviews in one step.
pub fn decode_reviews(bytes: &[u8], default_reviewer: &str) -> Result<Vec<NewReview>> {
    let rows = decode_rows(bytes)?;
    rows_to_reviews(&rows, default_reviewer)
}
