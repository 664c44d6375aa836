//! k-log - LLM-assisted Kubernetes log bundle analyzer
//!
//! Ingests a diagnostic bundle, packs it into budget-sized chunks,
//! analyzes the chunks concurrently with an LLM and renders one ranked,
//! deduplicated report.
//!
//! Exit codes:
//!   0 - Success (no critical findings, every chunk analyzed)
//!   1 - Runtime error (unreadable bundle, chunk budget, config, output)
//!   2 - Critical findings present or chunks left unanalyzed

mod analysis;
mod backend;
mod bundle;
mod chunker;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{AnalyzeArgs, Cli, Command};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Chunk, Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    // A .env file in the working directory may supply API keys.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    let exit_code = match cli.command {
        Command::InitConfig { force } => match handle_init_config(force) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        },
        Command::Analyze(args) => {
            if let Err(e) = args.validate() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            run(args).await
        }
    };

    std::process::exit(exit_code);
}

/// Handle `init-config`: generate a default .k-log.toml.
fn handle_init_config(force: bool) -> Result<i32> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists. Pass --force to overwrite it.",
            DEFAULT_CONFIG_FILE
        );
        return Ok(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the model, chunking, concurrency and more.");
    Ok(0)
}

/// Load configuration, set up logging and run the analysis.
async fn run(args: AnalyzeArgs) -> i32 {
    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };

    init_logging(&args, &config);

    info!("k-log v{}", env!("CARGO_PKG_VERSION"));
    match source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run_analysis(&args, &config).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            1
        }
    }
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG`, when set, takes precedence over the flags.
fn init_logging(args: &AnalyzeArgs, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: &AnalyzeArgs, config: &Config) -> Result<i32> {
    let start_time = Instant::now();

    if args.dry_run {
        return handle_dry_run(&args.bundle, config);
    }

    let backend = backend::build_backend(
        &config.model,
        Duration::from_secs(config.orchestrator.timeout_seconds),
    )?;
    let model_used = backend.describe();

    eprintln!("🔬 Analyzing {} with {}", args.bundle.display(), model_used);

    let progress = create_progress_bar(args.quiet);
    let output = pipeline::run_pipeline(&args.bundle, config, backend, progress).await?;

    let report = Report {
        metadata: ReportMetadata {
            bundle: args.bundle.display().to_string(),
            analysis_date: Utc::now(),
            model_used,
            units_ingested: output.bundle.units.len(),
            skipped_entries: output.bundle.skipped,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        analysis: output.report,
    };

    let rendered = report::render(&report, config.general.format)?;
    let output_path = config.general.output.as_deref().map(Path::new);
    report::write_output(&rendered, output_path)?;

    let analysis = &report.analysis;
    let summary = &analysis.summary;
    eprintln!("\n📊 Analysis Summary:");
    eprintln!("   Findings: {}", summary.total);
    eprintln!(
        "   - 🔴 Critical: {} | 🟡 Warning: {} | 🔵 Info: {}",
        summary.critical, summary.warning, summary.info
    );
    eprintln!("   Coverage: {:.1}%", analysis.coverage * 100.0);
    if !analysis.is_complete() {
        eprintln!(
            "   ⚠️  Unanalyzed chunks: {} of {}",
            analysis.unanalyzed_chunks.len(),
            analysis.total_chunks
        );
    }
    eprintln!("   Duration: {:.1}s", report.metadata.duration_seconds);
    if let Some(path) = output_path {
        eprintln!("\n✅ Report saved to: {}", path.display());
    }

    if analysis.needs_attention() {
        eprintln!("\n⛔ Critical findings or unanalyzed chunks. Exiting with code 2.");
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: ingest and chunk, print the plan, exit.
fn handle_dry_run(bundle_path: &Path, config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: planning chunks (no LLM call)...\n");

    let (bundle, chunks) = pipeline::plan(bundle_path, config)?;

    println!(
        "   {}: {} log units, {} chunks (budget {} {:?})\n",
        bundle.root.display(),
        bundle.units.len(),
        chunks.len(),
        config.chunking.budget,
        config.chunking.size_unit
    );
    for chunk in &chunks {
        println!("{}", describe_chunk(chunk));
    }

    if !bundle.skipped.is_empty() {
        println!("\n   Skipped entries:");
        for entry in &bundle.skipped {
            println!("     ⚠️  {} ({})", entry.path, entry.reason);
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

fn describe_chunk(chunk: &Chunk) -> String {
    let mut line = format!("   📦 chunk {} (size {}):", chunk.chunk_id, chunk.approx_size);
    for member in &chunk.members {
        line.push_str(&format!("\n     📄 {} [{}]", member.source_id, member.source_kind));
        if let Some(part) = member.part {
            line.push_str(&format!(" part {}/{}", part.index + 1, part.total));
        }
    }
    line
}

fn create_progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Load configuration from `--config`, `.k-log.toml` or defaults, then
/// apply command-line overrides. Returns the file the settings came from.
fn load_config(args: &AnalyzeArgs) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, source) = match args.config {
        Some(ref config_path) => (Config::load(config_path)?, Some(config_path.clone())),
        None => match Config::load_default()? {
            Some(config) => (config, Some(PathBuf::from(DEFAULT_CONFIG_FILE))),
            None => (Config::default(), None),
        },
    };

    config.merge_with_args(args);
    config.validate()?;

    Ok((config, source))
}
