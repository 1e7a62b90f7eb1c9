//! ReviewPulse - LLM-powered review batch analyzer
//!
//! A CLI tool that ingests a CSV of product reviews as a batch,
//! analyzes every review concurrently with a chat model and
//! generates a sentiment report for the batch.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad input, config, report write failure, etc.)

mod analysis;
mod cli;
mod config;
mod error;
mod inference;
mod ingest;
mod models;
mod pipeline;
mod report;
mod status;
mod store;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use inference::{InferenceClient, OpenAiTransport};
use models::{BatchId, BatchProgress, BatchStatus, Report, ReportMetadata};
use pipeline::{BatchEvent, BatchOrchestrator, PipelineMetrics};
use status::StatusProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::MemoryStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("ReviewPulse v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        "Arguments: file={:?} format={:?} product={:?} config={:?}",
        args.file, args.format, args.product, args.config
    );

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reviewpulse.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!(
        "✅ Created {} with default settings.",
        config::DEFAULT_CONFIG_FILE
    );
    println!("   Edit it to customize the model, concurrency and report.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Ingest, analyze and report one file. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let file = args.file.clone().context("No review file given")?;
    let bytes = std::fs::read(&file)
        .with_context(|| format!("Failed to read review file: {}", file.display()))?;
    let source_name = args.source_name();

    if args.dry_run {
        return handle_dry_run(&source_name, &bytes, &config);
    }

    let inference_config = config.inference_config(args.api_key.as_deref());
    if inference_config.api_key.is_none() {
        warn!(
            "No API key found in {}; every review will get the fallback analysis",
            config.model.api_key_env
        );
    }

    println!("🤖 Initializing analysis pipeline...");
    println!("   Model: {}", config.model.name);
    println!("   Endpoint: {}", config.model.api_url);
    println!("   Concurrency: {}", config.pipeline.concurrency);
    println!("   Timeout: {}s", config.model.timeout_seconds);

    let metrics = Arc::new(PipelineMetrics::new());
    let transport = OpenAiTransport::new(inference_config)?;
    let client = InferenceClient::new(
        Arc::new(transport),
        Duration::from_secs(config.model.timeout_seconds),
        metrics.clone(),
    );

    let store = Arc::new(MemoryStore::new());
    let (orchestrator, worker) = BatchOrchestrator::new(
        store.clone(),
        client,
        metrics.clone(),
        config.pipeline_config(),
    );
    let worker_handle = tokio::spawn(worker.run());
    let status = StatusProvider::new(store);

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BatchEvent::Finished(summary)) => info!(
                    "Batch {} finished: {} of {} analyses written",
                    summary.batch_id,
                    summary.analyses_written(),
                    summary.total_reviews
                ),
                Ok(event) => debug!("Batch event for {}: {:?}", event.batch_id(), event),
                Err(RecvError::Lagged(missed)) => debug!("Skipped {} batch events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let batch_events = orchestrator.subscribe();

    println!("\n📥 Ingesting {}...", file.display());
    let batch_id = orchestrator.upload(&source_name, &bytes).await?;
    info!("Batch {} queued", batch_id);

    println!("\n🔬 Analyzing reviews...");
    let progress = wait_for_batch(
        &status,
        batch_events,
        batch_id,
        Duration::from_millis(config.pipeline.poll_interval_ms),
        !args.quiet,
    )
    .await?;

    // Dropping the orchestrator closes the queue so the worker can finish.
    drop(orchestrator);
    match worker_handle.await {
        Ok(worker_report) => debug!("Worker finished: {:?}", worker_report),
        Err(e) => warn!("Analysis worker ended abnormally: {}", e),
    }

    println!("\n📝 Generating report...");

    let report = build_report(
        &status,
        batch_id,
        &source_name,
        &config,
        args.product.as_deref(),
        start_time.elapsed().as_secs_f64(),
        &metrics,
    )
    .await?;

    let output_path = output_path(&args, &config);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    let insights = &report.insights;
    println!("\n📊 Analysis Summary:");
    println!("   Batch: {} ({})", batch_id, progress.status);
    println!(
        "   Reviews analyzed: {}/{}",
        progress.analyzed, progress.total_reviews
    );
    println!(
        "   - 🟢 Positive: {} | 🟡 Neutral: {} | 🔴 Negative: {}",
        insights.positive, insights.neutral, insights.negative
    );
    if let Some(verdict) = insights.verdict {
        println!("   Verdict: {} {}", verdict.emoji(), verdict);
    }
    println!("   {}", report.metrics.summary());
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    Ok(0)
}

/// Poll batch progress until the batch reaches a terminal status.
///
/// Also stops when the worker reports the run failed or the worker goes
/// away, so a batch left `PROCESSING` can never hang the CLI.
async fn wait_for_batch(
    status: &StatusProvider<MemoryStore>,
    mut events: broadcast::Receiver<BatchEvent>,
    batch_id: BatchId,
    poll_interval: Duration,
    show_progress: bool,
) -> Result<BatchProgress> {
    let progress_bar = if show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    loop {
        let progress = status.get_progress(batch_id).await?;

        if let Some(ref pb) = progress_bar {
            pb.set_length(progress.total_reviews as u64);
            pb.set_position(progress.analyzed as u64);
        }

        if progress.status.is_terminal() {
            if let Some(ref pb) = progress_bar {
                pb.finish_and_clear();
            }
            if progress.status == BatchStatus::Failed {
                bail!("Batch {} failed during analysis", batch_id);
            }
            return Ok(progress);
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            event = events.recv() => match event {
                Ok(BatchEvent::Failed { batch_id: id, reason }) if id == batch_id => {
                    if let Some(ref pb) = progress_bar {
                        pb.abandon();
                    }
                    bail!("Batch {} failed: {}", batch_id, reason);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    let progress = status.get_progress(batch_id).await?;
                    if progress.status == BatchStatus::Completed {
                        return Ok(progress);
                    }
                    bail!("Analysis worker stopped before batch {} finished", batch_id);
                }
            },
        }
    }
}

async fn build_report(
    status: &StatusProvider<MemoryStore>,
    batch_id: BatchId,
    source_name: &str,
    config: &Config,
    product: Option<&str>,
    duration_seconds: f64,
    metrics: &PipelineMetrics,
) -> Result<Report> {
    let dashboard = status.get_dashboard(batch_id).await?;
    let progress = status.get_progress(batch_id).await?;
    let reviews = status.get_analyses(batch_id).await?;

    let insights = status
        .get_insights(batch_id, product, config.report.top_themes)
        .await?;
    if let Some(product) = product {
        if !insights.products.iter().any(|p| p == product) {
            warn!("Product '{}' does not appear in batch {}", product, batch_id);
        }
    }

    let metadata = ReportMetadata {
        batch_id,
        source_name: source_name.to_string(),
        analysis_date: Utc::now(),
        model_used: config.model.name.clone(),
        status: dashboard.status,
        total_reviews: progress.total_reviews,
        analyzed: progress.analyzed,
        average_confidence: analysis::average_confidence(reviews.iter().map(|r| &r.analysis)),
        duration_seconds,
    };

    Ok(Report {
        metadata,
        sentiment_distribution: dashboard.sentiment_distribution,
        insights,
        reviews: if config.report.include_reviews {
            reviews
        } else {
            Vec::new()
        },
        metrics: metrics.snapshot(),
    })
}

/// Handle --dry-run: decode the file, print what would be analyzed, exit.
fn handle_dry_run(source_name: &str, bytes: &[u8], config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: decoding {} (no model calls)...\n", source_name);

    let reviews = ingest::decode_reviews(bytes, &config.pipeline.default_reviewer)?;

    println!("   Found {} reviews that would be analyzed:\n", reviews.len());
    for review in &reviews {
        let preview: String = review.review_text.chars().take(60).collect();
        println!(
            "     📝 [{}] {}: {}",
            review.product_name, review.reviewer_name, preview
        );
    }
    println!("\n   Total: {} reviews", reviews.len());

    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(0)
}

/// Report path: explicit `--output`, else the configured one with the
/// extension matching the format.
fn output_path(args: &Args, config: &Config) -> PathBuf {
    match args.output {
        Some(ref path) => path.clone(),
        None => PathBuf::from(&config.general.output).with_extension(args.format.extension()),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
