// Embeddings module
// Chunking, the embedding provider registry and batched embedding generation

pub mod chunking;
pub mod gemini;
pub mod provider;
pub mod vectors;


use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

pub use chunking::{
    Chunk, ChunkMetadata, ChunkingConfig, FormatHint, UnknownFormat, chunk_document,
    estimate_token_count,
};
pub use gemini::GeminiEmbedder;
pub use provider::{EmbeddingProvider, ProviderSpec};
pub use vectors::{
    CostEstimate, cosine_similarity, cost_for_tokens, estimate_cost, is_valid_embedding,
    zero_vector,
};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Pacing for batched embedding generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Chunks per batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
    /// Upper bound on a single embedding request
    pub request_timeout: Option<Duration>,
}

impl Default for BatchSettings {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            request_timeout: None,
        }
    }
}

/// Outcome counters for one batched embedding run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total_chunks: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_tokens: usize,
    /// Approximate spend; failed items are still counted by their estimate
    pub estimated_cost: f64,
    pub processing_time_ms: u64,
    pub errors: Vec<String>,
}

/// Vectors for a chunk list. `vectors[i]` always belongs to `chunks[i]`;
/// failed items hold a zero vector of the provider's width.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub stats: EmbeddingStats,
}

/// Capability interface over an embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The provider whose model and dimensions this embedder produces
    fn provider(&self) -> EmbeddingProvider;

    /// Embed a single text. Errors propagate to the caller.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    fn batch_settings(&self) -> BatchSettings {
        BatchSettings::default()
    }

    /// Embed every chunk, tolerating per-item failures
    async fn embed_batch(&self, chunks: &[Chunk]) -> EmbeddingBatch {
        embed_in_batches(self, chunks, self.batch_settings()).await
    }
}

/// Run `embed_one` under an optional deadline; an elapsed deadline is an
/// embedding error like any transport failure.
#[inline]
pub async fn embed_with_timeout<E>(
    embedder: &E,
    text: &str,
    timeout: Option<Duration>,
) -> Result<Vec<f32>>
where
    E: Embedder + ?Sized,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, embedder.embed_one(text))
            .await
            .map_err(|_| RagError::Embedding(format!("request timed out after {:?}", limit)))?,
        None => embedder.embed_one(text).await,
    }
}

/// Embed chunks in fixed-size batches with a pause between batches.
///
/// A failed item never aborts the run: its slot receives a zero vector and
/// a message naming the batch is added to the stats.
#[inline]
pub async fn embed_in_batches<E>(
    embedder: &E,
    chunks: &[Chunk],
    settings: BatchSettings,
) -> EmbeddingBatch
where
    E: Embedder + ?Sized,
{
    let started = Instant::now();
    let provider = embedder.provider();
    let dimensions = provider.dimensions();
    let batch_size = settings.batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);

    let mut vectors = Vec::with_capacity(chunks.len());
    let mut errors = Vec::new();

    for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
        let batch_number = batch_index + 1;
        if batch_index > 0 && !settings.batch_delay.is_zero() {
            sleep(settings.batch_delay).await;
        }

        debug!(
            "Embedding batch {}/{} ({} chunks)",
            batch_number,
            total_batches,
            batch.len()
        );

        for chunk in batch {
            let index = chunk.metadata.chunk_index;
            match embed_with_timeout(embedder, &chunk.content, settings.request_timeout).await {
                Ok(vector) if vector.len() != dimensions => {
                    let message = format!(
                        "Batch {}: chunk {} returned {} dimensions, expected {}",
                        batch_number,
                        index,
                        vector.len(),
                        dimensions
                    );
                    warn!("{}", message);
                    errors.push(message);
                    vectors.push(zero_vector(dimensions));
                }
                Ok(vector) if !is_valid_embedding(&vector, dimensions) => {
                    let message = format!(
                        "Batch {}: chunk {} returned an all-zero or non-finite vector",
                        batch_number, index
                    );
                    warn!("{}", message);
                    errors.push(message);
                    vectors.push(zero_vector(dimensions));
                }
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    let message = format!("Batch {}: chunk {} failed: {}", batch_number, index, e);
                    warn!("{}", message);
                    errors.push(message);
                    vectors.push(zero_vector(dimensions));
                }
            }
        }
    }

    let cost = estimate_cost(chunks, provider);
    let stats = EmbeddingStats {
        total_chunks: chunks.len(),
        successful: chunks.len() - errors.len(),
        failed: errors.len(),
        total_tokens: cost.total_tokens,
        estimated_cost: cost.estimated_cost,
        processing_time_ms: started.elapsed().as_millis() as u64,
        errors,
    };

    info!(
        "Embedded {} chunks with {} ({} failed, ~{} tokens)",
        stats.total_chunks, provider, stats.failed, stats.total_tokens
    );

    EmbeddingBatch { vectors, stats }
}
