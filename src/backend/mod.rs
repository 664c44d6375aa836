//! Analysis backends.
//!
//! A backend takes one chunk and returns the raw findings a model produced
//! for it. The orchestrator only depends on [`AnalysisBackend`]; which API
//! and model serve the request is decided here.

pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod response;

use crate::config::ModelConfig;
use crate::models::Chunk;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// LLM API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ollama `/api/chat`
    #[default]
    Ollama,
    /// OpenAI-compatible `/chat/completions`
    Openai,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }
}

/// A finding as reported by the model, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default)]
    pub severity: String,
    #[serde(default, alias = "title")]
    pub summary: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default, alias = "sources")]
    pub source_ids: Vec<String>,
}

/// Parsed model response for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub findings: Vec<RawFinding>,
    /// Sources the model explicitly found healthy.
    #[serde(default)]
    pub no_issue: Vec<String>,
}

/// Errors returned by a backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Rejected(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("API error {}: {}", status, body);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            BackendError::RateLimited(message)
        } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            BackendError::Transport(message)
        } else {
            BackendError::Rejected(message)
        }
    }

    /// Classify a transport-level failure.
    pub fn from_reqwest(error: reqwest::Error, url: &str) -> Self {
        if error.is_timeout() {
            BackendError::Timeout(format!("no response from {}", url))
        } else if error.is_connect() {
            BackendError::Transport(format!("cannot connect to {}: {}", url, error))
        } else if error.is_decode() {
            BackendError::Malformed(format!("cannot decode response body: {}", error))
        } else {
            BackendError::Transport(format!("failed to send request: {}", error))
        }
    }
}

/// The external analysis capability.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Human-readable backend and model name.
    fn describe(&self) -> String;

    /// Analyze a single chunk.
    async fn analyze(&self, chunk: &Chunk) -> Result<RawAnalysis, BackendError>;
}

/// Build the backend selected by the model configuration.
pub fn build_backend(config: &ModelConfig, timeout: Duration) -> Result<Arc<dyn AnalysisBackend>> {
    let backend: Arc<dyn AnalysisBackend> = match config.provider {
        Provider::Ollama => Arc::new(ollama::OllamaBackend::new(config, timeout)?),
        Provider::Openai => Arc::new(openai::OpenAiBackend::new(config, timeout)?),
    };
    Ok(backend)
}
