//! Report rendering and output.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::cli::OutputFormat;
use crate::models::Report;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Render `report` in the requested format.
pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Markdown => Ok(generate_markdown_report(report)),
    }
}

/// Write rendered output to `path`, or to stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write report to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("Failed to write report to stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}
