
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embeddings::{BatchSettings, Embedder, EmbeddingProvider};
use crate::http::GeminiHttpClient;
use crate::{RagError, Result};

const HEALTH_CHECK_TEXT: &str = "health check";

/// Embedding client for the Gemini `embedContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: GeminiHttpClient,
    provider: EmbeddingProvider,
    batch_settings: BatchSettings,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    /// Build an embedder from configuration. Fails before any network
    /// access when no API key is available.
    #[inline]
    pub fn new(config: &EmbeddingConfig, provider: EmbeddingProvider) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            RagError::Config(format!(
                "no API key configured for {}; set {} or run `gem-rag config`",
                provider,
                crate::config::API_KEY_ENV
            ))
        })?;

        let client = GeminiHttpClient::new(&config.base_url, api_key)
            .map_err(|e| RagError::Config(format!("{:#}", e)))?
            .with_timeout(config.request_timeout())
            .with_retry_attempts(config.retry_attempts);

        Ok(Self::from_client(client, provider).with_batch_settings(config.batch_settings()))
    }

    #[inline]
    pub fn from_client(client: GeminiHttpClient, provider: EmbeddingProvider) -> Self {
        Self {
            client,
            provider,
            batch_settings: BatchSettings::default(),
        }
    }

    #[inline]
    pub fn with_batch_settings(mut self, settings: BatchSettings) -> Self {
        self.batch_settings = settings;
        self
    }

    /// Blocking single-text embedding
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_blocking_until(text, None)
    }

    /// Blocking embedding that stops retrying once `deadline` has passed
    #[inline]
    pub fn embed_blocking_until(
        &self,
        text: &str,
        deadline: Option<Instant>,
    ) -> Result<Vec<f32>> {
        let model = self.provider.model();
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self
            .client
            .model_url(model, Some("embedContent"))
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;

        let request = EmbedRequest {
            model: format!("models/{}", model),
            content: Content {
                parts: [Part { text }],
            },
        };

        let response_text = self
            .client
            .post_json_until(&url, &request, deadline)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        let values = response.embedding.values;
        let expected = self.provider.dimensions();
        if values.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }

        debug!("Generated embedding with {} dimensions", values.len());
        Ok(values)
    }

    /// Verify credentials and model by embedding a probe string
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for {}", self.provider);
        self.embed_blocking(HEALTH_CHECK_TEXT)?;
        info!(
            "Health check passed for {} at {}",
            self.provider,
            self.client.base_url()
        );
        Ok(())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    #[inline]
    fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    #[inline]
    fn batch_settings(&self) -> BatchSettings {
        self.batch_settings
    }

    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        // The blocking task outlives a caller-side timeout, so it carries its own
        let deadline = self
            .batch_settings
            .request_timeout
            .map(|limit| Instant::now() + limit);
        let embedder = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed_blocking_until(&text, deadline))
            .await
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
    }
}
