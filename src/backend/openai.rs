//! OpenAI-compatible chat completions backend.
//!
//! Works with any gateway exposing `/chat/completions` (OpenAI, LiteLLM
//! proxy, vLLM, ...).

use super::prompt::{build_user_prompt, SYSTEM_PROMPT};
use super::response::parse_analysis;
use super::{AnalysisBackend, BackendError, RawAnalysis};
use crate::config::ModelConfig;
use crate::models::Chunk;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends chunks to an OpenAI-compatible endpoint.
pub struct OpenAiBackend {
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model_name: String,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig, timeout: Duration) -> Result<Self> {
        let url = config.effective_url();
        info!(
            "Initializing OpenAI-compatible backend with model {} at {}",
            config.name, url
        );

        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; sending requests without an API key",
                config.api_key_env
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            url,
            api_key,
            model_name: config.name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OpenAiBackend {
    fn describe(&self) -> String {
        format!("openai/{}", self.model_name)
    }

    async fn analyze(&self, chunk: &Chunk) -> Result<RawAnalysis, BackendError> {
        let url = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let user_prompt = build_user_prompt(chunk);

        let request = CompletionRequest {
            model: &self.model_name,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!("Sending chunk {} to {}", chunk.chunk_id, url);

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, &url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::from_reqwest(e, &url))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Malformed("completion has no content".to_string()))?;

        parse_analysis(&content)
    }
}
