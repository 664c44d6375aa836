//! Ollama chat API backend.

use super::prompt::{build_user_prompt, SYSTEM_PROMPT};
use super::response::parse_analysis;
use super::{AnalysisBackend, BackendError, RawAnalysis};
use crate::config::ModelConfig;
use crate::models::Chunk;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Sends chunks to a local or remote Ollama server.
pub struct OllamaBackend {
    http_client: reqwest::Client,
    url: String,
    model_name: String,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig, timeout: Duration) -> Result<Self> {
        let url = config.effective_url();
        info!("Initializing Ollama backend with model {} at {}", config.name, url);

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            url,
            model_name: config.name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn describe(&self) -> String {
        format!("ollama/{}", self.model_name)
    }

    async fn analyze(&self, chunk: &Chunk) -> Result<RawAnalysis, BackendError> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(chunk),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!("Sending chunk {} to {}", chunk.chunk_id, url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, &url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::from_reqwest(e, &url))?;

        parse_analysis(&chat_response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = OllamaChatRequest {
            model: "llama3.2:latest".to_string(),
            messages: vec![],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: None,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert!(json["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_describe() {
        let backend = OllamaBackend::new(&ModelConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(backend.describe(), "ollama/llama3.2:latest");
    }
}
