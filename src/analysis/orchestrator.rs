//! Concurrent chunk analysis.
//!
//! Every chunk is spawned as its own task in submission order; a semaphore
//! bounds how many talk to the backend at once. Each task returns its own
//! outcome, and the collection loop files it into the chunk's slot, so no
//! result list is shared between tasks.

use crate::backend::{AnalysisBackend, BackendError, RawAnalysis};
use crate::error::ChunkAnalysisFailure;
use crate::models::{Chunk, ChunkAnalysis, ChunkOutcome, Finding, FindingId, Severity};
use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Worker pool parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum analyses in flight.
    pub concurrency: usize,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Timeout for a single backend call.
    pub call_timeout: Duration,
    /// Deadline for the whole orchestration phase.
    pub deadline: Option<Duration>,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl From<&crate::config::OrchestratorSettings> for OrchestratorConfig {
    fn from(settings: &crate::config::OrchestratorSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            retries: settings.retries,
            call_timeout: Duration::from_secs(settings.timeout_seconds),
            deadline: settings.deadline_seconds.map(Duration::from_secs),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

/// Dispatches chunks to an analysis backend.
pub struct AnalysisOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    config: OrchestratorConfig,
    progress: ProgressBar,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report completed chunks on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Analyze every chunk, returning exactly one outcome per chunk in
    /// chunk order.
    pub async fn run(&self, chunks: Vec<Chunk>) -> Vec<ChunkOutcome> {
        let chunk_ids: Vec<usize> = chunks.iter().map(|c| c.chunk_id).collect();
        let mut slots: Vec<Option<ChunkOutcome>> = chunk_ids.iter().map(|_| None).collect();

        info!(
            "Analyzing {} chunks with up to {} in flight",
            chunk_ids.len(),
            self.config.concurrency
        );
        self.progress.set_length(chunk_ids.len() as u64);

        let deadline = self
            .config
            .deadline
            .map(|d| tokio::time::Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (slot, chunk) in chunks.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let failure =
                            ChunkAnalysisFailure::TaskAborted("worker pool closed".into());
                        return (slot, ChunkOutcome::Failed { chunk_id: chunk.chunk_id, failure });
                    }
                };
                (slot, analyze_chunk(backend.as_ref(), &chunk, &config).await)
            });
        }

        let mut deadline_hit = false;

        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else { break };
            self.collect(joined, &mut slots);
        }

        if deadline_hit {
            warn!(
                "Analysis deadline elapsed with {} chunks outstanding; abandoning them",
                tasks.len()
            );
            tasks.abort_all();
            // Tasks that finished before the abort still hand in their result.
            while let Some(joined) = tasks.join_next().await {
                if !matches!(joined, Err(ref e) if e.is_cancelled()) {
                    self.collect(joined, &mut slots);
                }
            }
        }

        self.progress.finish_and_clear();

        let outcomes: Vec<ChunkOutcome> = slots
            .into_iter()
            .zip(chunk_ids)
            .map(|(slot, chunk_id)| {
                slot.unwrap_or_else(|| ChunkOutcome::Failed {
                    chunk_id,
                    failure: if deadline_hit {
                        ChunkAnalysisFailure::DeadlineExceeded
                    } else {
                        ChunkAnalysisFailure::TaskAborted("analysis task panicked".to_string())
                    },
                })
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            "Chunk analysis finished: {} analyzed, {} unanalyzed",
            outcomes.len() - failed,
            failed
        );

        outcomes
    }

    fn collect(
        &self,
        joined: Result<(usize, ChunkOutcome), tokio::task::JoinError>,
        slots: &mut [Option<ChunkOutcome>],
    ) {
        match joined {
            Ok((slot, outcome)) => {
                self.progress.inc(1);
                slots[slot] = Some(outcome);
            }
            Err(e) => warn!("Analysis task failed: {}", e),
        }
    }
}

/// Run one chunk through the backend with timeout, retry and backoff.
async fn analyze_chunk(
    backend: &dyn AnalysisBackend,
    chunk: &Chunk,
    config: &OrchestratorConfig,
) -> ChunkOutcome {
    let chunk_id = chunk.chunk_id;
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(config.call_timeout, backend.analyze(chunk)).await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!(
                "no response within {:?}",
                config.call_timeout
            ))),
        };

        match result {
            Ok(raw) => {
                let analysis = normalize_analysis(chunk, raw);
                debug!(
                    "Chunk {} analyzed: {} findings from [{}]",
                    chunk_id,
                    analysis.findings.len(),
                    chunk.member_unit_ids().join(", ")
                );
                return ChunkOutcome::Analyzed { chunk_id, analysis };
            }
            Err(e) if !e.is_transient() => {
                warn!("Chunk {} rejected by backend: {}", chunk_id, e);
                return ChunkOutcome::Failed {
                    chunk_id,
                    failure: ChunkAnalysisFailure::Permanent(e.to_string()),
                };
            }
            Err(e) if attempt >= config.retries => {
                warn!(
                    "Chunk {} failed after {} attempts: {}",
                    chunk_id,
                    attempt + 1,
                    e
                );
                return ChunkOutcome::Failed {
                    chunk_id,
                    failure: ChunkAnalysisFailure::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    },
                };
            }
            Err(e) => {
                let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
                debug!(
                    "Chunk {} attempt {} failed ({}); retrying in {:?}",
                    chunk_id,
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff with up to 50% random jitter.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);

    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(32)).min(max_ms);
    let jitter_ms = fastrand::u64(0..=exp_ms / 2);

    Duration::from_millis(exp_ms.saturating_add(jitter_ms))
}

/// Turn a raw model response into findings owned by this chunk.
fn normalize_analysis(chunk: &Chunk, raw: RawAnalysis) -> ChunkAnalysis {
    let sole_member = match chunk.members.as_slice() {
        [only] => Some(only.source_id.clone()),
        _ => None,
    };

    let mut findings = Vec::new();

    for raw_finding in raw.findings {
        let summary = raw_finding.summary.trim().to_string();
        if summary.is_empty() {
            debug!("Chunk {}: discarding finding without summary", chunk.chunk_id);
            continue;
        }

        let mut source_ids: BTreeSet<String> = raw_finding
            .source_ids
            .into_iter()
            .filter(|id| {
                let known = chunk.contains_source(id);
                if !known {
                    debug!("Chunk {}: dropping unknown source id {}", chunk.chunk_id, id);
                }
                known
            })
            .collect();

        if source_ids.is_empty() {
            if let Some(ref only) = sole_member {
                source_ids.insert(only.clone());
            }
        }

        findings.push(Finding {
            finding_id: FindingId {
                chunk: chunk.chunk_id,
                seq: findings.len(),
            },
            severity: Severity::from_label(&raw_finding.severity),
            source_ids,
            summary,
            evidence: raw_finding.evidence.trim().to_string(),
            chunk_origin: chunk.chunk_id,
            occurrences: 1,
        });
    }

    let cleared = raw
        .no_issue
        .into_iter()
        .filter(|id| chunk.contains_source(id))
        .collect();

    ChunkAnalysis { findings, cleared }
}
