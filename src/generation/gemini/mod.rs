
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, ChatRequest};
use crate::config::{EmbeddingConfig, GenerationConfig};
use crate::http::GeminiHttpClient;
use crate::{RagError, Result};

/// Chat client for the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiChatClient {
    client: GeminiHttpClient,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: [Content<'a>; 1],
    generation_config: SamplingConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SamplingConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiChatClient {
    /// Build a chat client sharing the embedding client's credentials and
    /// transport settings
    #[inline]
    pub fn new(connection: &EmbeddingConfig, generation: &GenerationConfig) -> Result<Self> {
        let api_key = connection.resolve_api_key().ok_or_else(|| {
            RagError::Config(format!(
                "no API key configured for {}; set {} or run `gem-rag config`",
                generation.model,
                crate::config::API_KEY_ENV
            ))
        })?;

        let client = GeminiHttpClient::new(&connection.base_url, api_key)
            .map_err(|e| RagError::Config(format!("{:#}", e)))?
            .with_timeout(connection.request_timeout())
            .with_retry_attempts(connection.retry_attempts);

        Ok(Self::from_client(client, generation))
    }

    #[inline]
    pub fn from_client(client: GeminiHttpClient, generation: &GenerationConfig) -> Self {
        Self {
            client,
            model: generation.model.clone(),
            temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Blocking single-turn completion
    #[inline]
    pub fn generate_blocking(&self, request: &ChatRequest) -> Result<String> {
        let url = self
            .client
            .model_url(&self.model, Some("generateContent"))
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        let system_prompt = request.system_prompt.trim();
        let body = GenerateRequest {
            system_instruction: (!system_prompt.is_empty()).then_some(Content {
                role: None,
                parts: [Part {
                    text: system_prompt,
                }],
            }),
            contents: [Content {
                role: Some("user"),
                parts: [Part {
                    text: &request.message,
                }],
            }],
            generation_config: SamplingConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        debug!(
            "Requesting completion from {} (system prompt: {} chars)",
            self.model,
            system_prompt.len()
        );

        let response_text = self
            .client
            .post_json(&url, &body)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        let response: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Generation(format!("Failed to parse generation response: {}", e))
        })?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RagError::Generation(format!(
                "{} returned no text",
                self.model
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl ChatModel for GeminiChatClient {
    #[inline]
    async fn generate(&self, request: &ChatRequest) -> Result<String> {
        let client = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || client.generate_blocking(&request))
            .await
            .map_err(|e| RagError::Generation(format!("generation task failed: {}", e)))?
    }
}
