//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Flags that have a configuration file counterpart
//! are optional so the file value survives when the flag is absent.

use crate::backend::Provider;
use crate::chunker::{SizeUnit, SplitPolicy};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// k-log - LLM-assisted Kubernetes log bundle analyzer
///
/// Splits a diagnostic bundle (pod logs, events, describe output) into
/// budget-sized chunks, analyzes them concurrently with an LLM and merges
/// the findings into one ranked report.
///
/// Examples:
///   k-log analyze ./must-gather.tar.gz
///   k-log analyze ./bundle --provider openai --model gpt-4o-mini --format json
///   k-log analyze ./bundle --budget 8000 --size-unit tokens --dry-run
///   k-log init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Analyze a log bundle and print or save a diagnostic report
    Analyze(AnalyzeArgs),

    /// Generate a default .k-log.toml configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Bundle to analyze: a directory, a .tar/.tar.gz/.tgz archive or a
    /// single log file
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Path to configuration file
    ///
    /// If not specified, looks for .k-log.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Size budget per chunk (in --size-unit)
    #[arg(long, value_name = "N")]
    pub budget: Option<usize>,

    /// Maximum number of chunks before the run is refused
    #[arg(long, value_name = "N")]
    pub max_chunks: Option<usize>,

    /// How chunk sizes are measured
    #[arg(long, value_name = "UNIT")]
    pub size_unit: Option<SizeUnit>,

    /// How units larger than the budget are handled
    #[arg(long, value_name = "POLICY")]
    pub split_policy: Option<SplitPolicy>,

    /// Number of chunks analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Retries per chunk after the first attempt
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Timeout for a single LLM call in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Deadline for the whole analysis phase in seconds
    ///
    /// Chunks still outstanding when it elapses are reported as unanalyzed.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Summary similarity (0-1] above which findings are merged
    #[arg(long, value_name = "F")]
    pub similarity_threshold: Option<f64>,

    /// LLM API flavour
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Model name
    #[arg(short, long, env = "K_LOG_MODEL")]
    pub model: Option<String>,

    /// Base URL of the LLM API
    #[arg(long, value_name = "URL", env = "K_LOG_URL")]
    pub url: Option<String>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path for the report (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Dry run: ingest and chunk the bundle without calling the LLM
    ///
    /// Shows the chunk plan and exits.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no progress bar)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl AnalyzeArgs {
    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.budget == Some(0) {
            return Err("Budget must be at least 1".to_string());
        }
        if self.max_chunks == Some(0) {
            return Err("Max chunks must be at least 1".to_string());
        }
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        if let Some(threshold) = self.similarity_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err("Similarity threshold must be in (0, 1]".to_string());
            }
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if !self.bundle.exists() {
            return Err(format!("Bundle does not exist: {}", self.bundle.display()));
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
}
