//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// ReviewPulse - LLM-powered sentiment analysis for product review uploads
///
/// Ingests a CSV of reviews as a batch, annotates every review with a
/// language model and writes a Markdown/JSON report of the results.
///
/// The CSV's first row is a header. Columns are positional:
/// id, product, review text, reviewer (optional).
///
/// Examples:
///   reviewpulse --file reviews.csv
///   reviewpulse --file reviews.csv --model gpt-4o --concurrency 16
///   reviewpulse --file reviews.csv --product "Desk Lamp" --format json
///   reviewpulse --file reviews.csv --dry-run
///   reviewpulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// CSV file of reviews to ingest
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub file: Option<PathBuf>,

    /// Chat model used to analyze reviews
    ///
    /// Can also be set via REVIEWPULSE_MODEL env var or .reviewpulse.toml config.
    #[arg(short, long, env = "REVIEWPULSE_MODEL")]
    pub model: Option<String>,

    /// Chat-completions endpoint URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// API key for the inference endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Maximum reviews analyzed at the same time
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Per-review inference timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Restrict report insights to one product
    #[arg(long, value_name = "NAME")]
    pub product: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewpulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: decode the file and list the reviews without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .reviewpulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// File extension matching the format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        match self.file {
            Some(ref path) if !path.is_file() => {
                return Err(format!("Review file does not exist: {}", path.display()));
            }
            None => return Err("A review file is required (--file)".to_string()),
            _ => {}
        }

        if !self.dry_run {
            if let Some(ref url) = self.api_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("API URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Name recorded on the batch: the file name without directories.
    pub fn source_name(&self) -> String {
        self.file
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string())
    }
}
