//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{InferenceProvider, InferenceResponse};
use crate::config::Config;
use crate::error::AgentError;

/// HTTP client for the Gemini REST endpoint. One instance is pinned to one
/// model; callers pick the model when wiring the pipeline.
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_output_tokens: u64,
}

impl GeminiClient {
    /// # Errors
    ///
    /// Returns [`AgentError::Inference`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &Config, model: impl Into<String>) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AgentError::Inference(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    async fn call(&self, prompt: &str, call_type: &str) -> Result<InferenceResponse, AgentError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        tracing::debug!(
            model = %self.model,
            call_type,
            prompt_chars = prompt.len(),
            "Dispatching inference request"
        );

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AgentError::Connectivity(format!("inference request failed: {}", e))
                } else {
                    AgentError::Inference(format!("inference request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Inference(format!(
                "inference endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Inference(format!("malformed inference response: {}", e)))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| {
                AgentError::Inference("inference response had no candidates".to_string())
            })?;

        tracing::debug!(call_type, response_chars = text.len(), "Inference response received");
        Ok(InferenceResponse::from_raw(&text))
    }
}

// ==================== Wire types ====================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
