
use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::Chunk;
use crate::embeddings::provider::EmbeddingProvider;
use crate::{RagError, Result};

/// Token and cost projection for a set of chunks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_tokens: usize,
    /// Approximate spend in USD; not a billing figure
    pub estimated_cost: f64,
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0 when either vector has zero magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot = x.mul_add(y, dot);
        norm_a = x.mul_add(x, norm_a);
        norm_b = y.mul_add(y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// True when the vector has the expected width, only finite entries and a
/// non-zero norm
#[inline]
pub fn is_valid_embedding(vector: &[f32], dimensions: usize) -> bool {
    vector.len() == dimensions
        && vector.iter().all(|v| v.is_finite())
        && vector.iter().any(|v| *v != 0.0)
}

/// Placeholder recorded for a chunk whose embedding request failed
#[inline]
pub fn zero_vector(dimensions: usize) -> Vec<f32> {
    vec![0.0; dimensions]
}

/// Cost of embedding the given chunks, from their pre-computed token
/// estimates. Performs no network calls.
#[inline]
pub fn estimate_cost(chunks: &[Chunk], provider: EmbeddingProvider) -> CostEstimate {
    let total_tokens = chunks.iter().map(|c| c.metadata.tokens).sum();
    CostEstimate {
        total_tokens,
        estimated_cost: cost_for_tokens(total_tokens, provider),
    }
}

#[inline]
pub fn cost_for_tokens(tokens: usize, provider: EmbeddingProvider) -> f64 {
    (tokens as f64 / 1000.0) * provider.spec().cost_per_1k_tokens
}
