//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.k-log.toml` files. Explicit command-line flags take precedence.

use crate::backend::Provider;
use crate::bundle::SourceClassifier;
use crate::chunker::{SizeUnit, SplitPolicy};
use crate::cli::{AnalyzeArgs, OutputFormat};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".k-log.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Bundle classification settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Finding deduplication settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output file; stdout when unset.
    #[serde(default)]
    pub output: Option<String>,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which API the backend speaks.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base URL of the API. Defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,

    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    /// The configured URL, or the provider's default.
    pub fn effective_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| self.provider.default_url().to_string())
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

/// Glob patterns used to classify bundle entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_event_patterns")]
    pub event_patterns: Vec<String>,

    #[serde(default = "default_describe_patterns")]
    pub describe_patterns: Vec<String>,

    #[serde(default = "default_pod_patterns")]
    pub pod_patterns: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            event_patterns: default_event_patterns(),
            describe_patterns: default_describe_patterns(),
            pod_patterns: default_pod_patterns(),
        }
    }
}

fn default_event_patterns() -> Vec<String> {
    vec![
        "**/events/**",
        "**/events.*",
        "**/*-events.*",
        "**/*_events.*",
        "**/*.events",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_describe_patterns() -> Vec<String> {
    vec![
        "**/describe/**",
        "**/describes/**",
        "**/describe*",
        "**/*-describe.*",
        "**/*_describe.*",
        "**/*.describe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_pod_patterns() -> Vec<String> {
    vec![
        "**/pods/**",
        "**/containers/**",
        "**/logs/**",
        "**/*.log",
        "**/*.log.[0-9]*",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum size per chunk, in `size_unit`.
    #[serde(default = "default_budget")]
    pub budget: usize,

    /// Ceiling on the number of chunks per bundle.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    #[serde(default)]
    pub size_unit: SizeUnit,

    #[serde(default)]
    pub split_policy: SplitPolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            max_chunks: default_max_chunks(),
            size_unit: SizeUnit::default(),
            split_policy: SplitPolicy::default(),
        }
    }
}

fn default_budget() -> usize {
    24_000
}

fn default_max_chunks() -> usize {
    200
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Number of chunk analyses in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries after the first attempt on transient failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Deadline for the whole analysis phase, in seconds.
    #[serde(default)]
    pub deadline_seconds: Option<u64>,

    /// First backoff delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retries: default_retries(),
            timeout_seconds: default_timeout(),
            deadline_seconds: None,
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    300
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    30_000
}

/// Finding deduplication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Minimum summary similarity (0-1] for two findings to merge.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Width of the band below the threshold reported as ambiguous.
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_ambiguity_margin() -> f64 {
    0.15
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
    /// Only flags given explicitly override the file.
    pub fn merge_with_args(&mut self, args: &AnalyzeArgs) {
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.url {
            self.model.url = Some(url.clone());
        }

        if let Some(budget) = args.budget {
            self.chunking.budget = budget;
        }
        if let Some(max_chunks) = args.max_chunks {
            self.chunking.max_chunks = max_chunks;
        }
        if let Some(size_unit) = args.size_unit {
            self.chunking.size_unit = size_unit;
        }
        if let Some(split_policy) = args.split_policy {
            self.chunking.split_policy = split_policy;
        }

        if let Some(concurrency) = args.concurrency {
            self.orchestrator.concurrency = concurrency;
        }
        if let Some(retries) = args.retries {
            self.orchestrator.retries = retries;
        }
        if let Some(timeout) = args.timeout {
            self.orchestrator.timeout_seconds = timeout;
        }
        if let Some(deadline) = args.deadline {
            self.orchestrator.deadline_seconds = Some(deadline);
        }

        if let Some(threshold) = args.similarity_threshold {
            self.aggregation.similarity_threshold = threshold;
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.budget == 0 {
            bail!("chunking.budget must be at least 1");
        }
        if self.chunking.max_chunks == 0 {
            bail!("chunking.max_chunks must be at least 1");
        }
        if self.orchestrator.concurrency == 0 {
            bail!("orchestrator.concurrency must be at least 1");
        }
        if self.orchestrator.timeout_seconds == 0 {
            bail!("orchestrator.timeout_seconds must be at least 1");
        }
        if self.orchestrator.deadline_seconds == Some(0) {
            bail!("orchestrator.deadline_seconds must be at least 1");
        }

        let threshold = self.aggregation.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            bail!("aggregation.similarity_threshold must be in (0, 1], got {}", threshold);
        }
        if !(0.0..=1.0).contains(&self.aggregation.ambiguity_margin) {
            bail!("aggregation.ambiguity_margin must be in [0, 1]");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!("model.temperature must be between 0.0 and 2.0");
        }

        let url = self.model.effective_url();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("model.url must start with 'http://' or 'https://'");
        }

        SourceClassifier::from_config(&self.ingest).context("Invalid ingest pattern")?;

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> AnalyzeArgs {
        AnalyzeArgs {
            bundle: PathBuf::from("bundle"),
            config: None,
            budget: None,
            max_chunks: None,
            size_unit: None,
            split_policy: None,
            concurrency: None,
            retries: None,
            timeout: None,
            deadline: None,
            similarity_threshold: None,
            provider: None,
            model: None,
            url: None,
            format: None,
            output: None,
            dry_run: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.orchestrator.concurrency, 4);
        assert_eq!(config.orchestrator.retries, 3);
        assert_eq!(config.chunking.split_policy, SplitPolicy::Lines);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
format = "json"

[model]
provider = "openai"
name = "gpt-4o-mini"

[chunking]
budget = 8000
size_unit = "tokens"
split_policy = "whole"

[orchestrator]
concurrency = 2
deadline_seconds = 600

[aggregation]
similarity_threshold = 0.9
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.model.provider, Provider::Openai);
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.chunking.budget, 8000);
        assert_eq!(config.chunking.max_chunks, 200);
        assert_eq!(config.chunking.size_unit, SizeUnit::Tokens);
        assert_eq!(config.chunking.split_policy, SplitPolicy::Whole);
        assert_eq!(config.orchestrator.concurrency, 2);
        assert_eq!(config.orchestrator.retries, 3);
        assert_eq!(config.orchestrator.deadline_seconds, Some(600));
        assert_eq!(config.aggregation.similarity_threshold, 0.9);
    }

    #[test]
    fn test_merge_only_overrides_explicit_flags() {
        let mut config: Config = toml::from_str("[chunking]\nbudget = 8000\n").unwrap();
        let mut args = args();
        args.concurrency = Some(8);
        args.model = Some("qwen2.5:14b".to_string());

        config.merge_with_args(&args);

        assert_eq!(config.chunking.budget, 8000);
        assert_eq!(config.orchestrator.concurrency, 8);
        assert_eq!(config.model.name, "qwen2.5:14b");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.chunking.budget = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.aggregation.similarity_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.orchestrator.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.pod_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_url_follows_provider() {
        let mut model = ModelConfig::default();
        assert_eq!(model.effective_url(), "http://localhost:11434");

        model.provider = Provider::Openai;
        assert_eq!(model.effective_url(), "https://api.openai.com/v1");

        model.url = Some("http://gateway:4000".to_string());
        assert_eq!(model.effective_url(), "http://gateway:4000");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[chunking]"));
        assert!(toml_str.contains("[orchestrator]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chunking.budget, 24_000);
    }
}
