//! End-to-end pipeline: ingest, chunk, analyze, aggregate.

use crate::analysis::{AggregatorConfig, AnalysisOrchestrator, OrchestratorConfig, ResultAggregator};
use crate::backend::AnalysisBackend;
use crate::bundle::{Bundle, BundleIngestor, SourceClassifier};
use crate::chunker::{Chunker, ChunkerConfig};
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{AggregatedReport, Chunk};
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything a run produced, for the report renderer.
#[derive(Debug)]
pub struct PipelineOutput {
    pub bundle: Bundle,
    pub report: AggregatedReport,
}

/// Ingest the bundle and split it into chunks without analyzing anything.
pub fn plan(bundle_path: &Path, config: &Config) -> Result<(Bundle, Vec<Chunk>), PipelineError> {
    let classifier = SourceClassifier::from_config(&config.ingest)
        .map_err(|e| PipelineError::Config(format!("invalid ingest pattern: {}", e)))?;

    let bundle = BundleIngestor::new(classifier).ingest(bundle_path)?;
    let chunks = Chunker::new(ChunkerConfig::from(&config.chunking)).chunk(&bundle.units)?;

    info!(
        "Planned {} chunks for {} log units",
        chunks.len(),
        bundle.units.len()
    );

    Ok((bundle, chunks))
}

/// Run the whole pipeline against `backend`.
///
/// Fails only on ingest, chunk budget or configuration errors; chunks that
/// could not be analyzed are reported in the result instead.
pub async fn run_pipeline(
    bundle_path: &Path,
    config: &Config,
    backend: Arc<dyn AnalysisBackend>,
    progress: ProgressBar,
) -> Result<PipelineOutput, PipelineError> {
    let (bundle, chunks) = plan(bundle_path, config)?;

    let orchestrator =
        AnalysisOrchestrator::new(backend, OrchestratorConfig::from(&config.orchestrator))
            .with_progress(progress);
    let outcomes = orchestrator.run(chunks).await;

    let aggregator = ResultAggregator::new(AggregatorConfig::from(&config.aggregation));
    let report = aggregator.aggregate(&bundle.unit_ids(), outcomes);

    Ok(PipelineOutput { bundle, report })
}
