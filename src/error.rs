//! Error types for the analysis pipeline.
//!
//! Ingest and chunk-budget errors are fatal and abort a run before any
//! chunk is dispatched. Chunk analysis failures are recorded per chunk and
//! never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// The bundle could not be turned into log units.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unreadable bundle '{}': {reason}", path.display())]
    UnreadableBundle { path: PathBuf, reason: String },
}

impl IngestError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnreadableBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// The bundle does not fit into the configured number of chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkBudgetError {
    #[error(
        "chunk count exceeds ceiling: bundle needs more than {ceiling} chunks at a budget of {budget}; raise `budget` or `max_chunks`"
    )]
    ChunkCountExceedsCeiling { ceiling: usize, budget: usize },
}

/// Why a chunk ended up without findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkAnalysisFailure {
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("backend rejected the chunk: {0}")]
    Permanent(String),

    #[error("abandoned when the pipeline deadline elapsed")]
    DeadlineExceeded,

    #[error("analysis task did not complete: {0}")]
    TaskAborted(String),
}

/// Fatal pipeline errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    ChunkBudget(#[from] ChunkBudgetError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_message() {
        let err = IngestError::unreadable("/tmp/bundle", "bundle contains zero entries");
        assert_eq!(
            err.to_string(),
            "unreadable bundle '/tmp/bundle': bundle contains zero entries"
        );
    }

    #[test]
    fn test_chunk_budget_error_mentions_remedy() {
        let err = ChunkBudgetError::ChunkCountExceedsCeiling {
            ceiling: 10,
            budget: 500,
        };
        let message = err.to_string();
        assert!(message.contains("10 chunks"));
        assert!(message.contains("max_chunks"));
    }

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err: PipelineError = ChunkBudgetError::ChunkCountExceedsCeiling {
            ceiling: 1,
            budget: 2,
        }
        .into();
        assert!(err.to_string().starts_with("chunk count exceeds ceiling"));
    }
}
