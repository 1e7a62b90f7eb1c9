//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reviewpulse.toml` files.

use crate::inference::InferenceConfig;
use crate::models::ANONYMOUS_REVIEWER;
use crate::pipeline::PipelineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".reviewpulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "reviewpulse_report.md".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Chat model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Chat-completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-review timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Environment variable holding the API key. The key itself never
    /// lives in the file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_url: default_api_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Batch pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Reviews analyzed at the same time within a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Batches waiting for the worker before uploads are refused.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Reviewer label for rows without one.
    #[serde(default = "default_reviewer")]
    pub default_reviewer: String,

    /// How often the CLI polls batch progress.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            default_reviewer: default_reviewer(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    16
}

fn default_reviewer() -> String {
    ANONYMOUS_REVIEWER.to_string()
}

fn default_poll_interval() -> u64 {
    250
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Pros/cons themes listed per section.
    #[serde(default = "default_top_themes")]
    pub top_themes: usize,

    /// Include every analyzed review in the report.
    #[serde(default = "default_true")]
    pub include_reviews: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_themes: default_top_themes(),
            include_reviews: true,
        }
    }
}

fn default_top_themes() -> usize {
    crate::analysis::DEFAULT_TOP_THEMES
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the CLI provides explicitly are overridden.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.api_url {
            self.model.api_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.pipeline.concurrency = concurrency;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.to_string_lossy().into_owned();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Inference settings with the API key resolved.
    ///
    /// An explicit key wins over the variable named by `api_key_env`.
    pub fn inference_config(&self, explicit_key: Option<&str>) -> InferenceConfig {
        let api_key = explicit_key
            .map(String::from)
            .or_else(|| std::env::var(&self.model.api_key_env).ok())
            .filter(|key| !key.trim().is_empty());

        InferenceConfig {
            api_url: self.model.api_url.clone(),
            api_key,
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.pipeline.concurrency.max(1),
            queue_capacity: self.pipeline.queue_capacity.max(1),
            default_reviewer: self.pipeline.default_reviewer.clone(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
