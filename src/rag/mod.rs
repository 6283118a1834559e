// Retrieval orchestration
// Indexes documents (chunk, embed, store) and answers similarity queries

pub mod progress;


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::database::{
    CollectionStats, EmbeddingRecord, IndexStore, SimilarityMatch, insert_in_batches,
};
use crate::embeddings::{
    BatchSettings, Chunk, Embedder, FormatHint, chunk_document, embed_with_timeout, estimate_cost,
    is_valid_embedding,
};
use crate::{RagError, Result};

pub use progress::{IndexingPhase, IndexingProgress, NoopObserver, ProgressObserver};

const PREVIEW_SAMPLE_SIZE: usize = 3;
/// Assumed round-trip per embedding request, used only for previews
const ESTIMATED_REQUEST_MS: u64 = 250;

/// One document handed over by the upload/parsing collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    pub collection_id: String,
    pub document_id: String,
    pub content: String,
    pub source_name: String,
    pub format: FormatHint,
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingStats {
    pub total_chunks: usize,
    /// Records actually inserted; may trail `total_chunks`
    pub total_embeddings: usize,
    pub total_tokens: usize,
    pub processing_time_ms: u64,
    pub estimated_cost: f64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSearchResult {
    pub matches: Vec<SimilarityMatch>,
    pub threshold: f32,
    pub total_matches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub processing_time_ms: u64,
    pub total_matches: usize,
    pub top_similarity: Option<f32>,
    pub context_characters: usize,
}

/// Grounding material for a generation call. An empty `context` means no
/// grounding is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiContext {
    pub context: String,
    pub sources: Vec<String>,
    pub search_result: RagSearchResult,
    pub stats: RetrievalStats,
}

/// Chunking dry run; performs no network calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingPreview {
    pub sample_chunks: Vec<Chunk>,
    pub total_chunks: usize,
    pub estimated_tokens: usize,
    pub estimated_cost: f64,
    pub estimated_time: String,
}

/// Rough wall-clock estimate for embedding `chunk_count` chunks
#[inline]
pub fn format_processing_estimate(chunk_count: usize, settings: &BatchSettings) -> String {
    let batches = chunk_count.div_ceil(settings.batch_size.max(1)) as u64;
    let delay_ms = settings.batch_delay.as_millis() as u64;
    let total_ms =
        chunk_count as u64 * ESTIMATED_REQUEST_MS + batches.saturating_sub(1) * delay_ms;
    let seconds = total_ms.div_ceil(1000).max(1);

    if seconds == 1 {
        "~1 second".to_string()
    } else if seconds < 60 {
        format!("~{} seconds", seconds)
    } else {
        let minutes = seconds.div_ceil(60);
        if minutes == 1 {
            "~1 minute".to_string()
        } else {
            format!("~{} minutes", minutes)
        }
    }
}

/// Chunk a document and project its embedding cost without calling the
/// provider
#[inline]
pub fn preview_indexing(
    content: &str,
    source_name: &str,
    format: FormatHint,
    config: &RagConfig,
    settings: &BatchSettings,
) -> IndexingPreview {
    let chunks = chunk_document(content, format, source_name, &config.chunking);
    let cost = estimate_cost(&chunks, config.embedding_provider);

    IndexingPreview {
        estimated_time: format_processing_estimate(chunks.len(), settings),
        total_chunks: chunks.len(),
        estimated_tokens: cost.total_tokens,
        estimated_cost: cost.estimated_cost,
        sample_chunks: chunks.into_iter().take(PREVIEW_SAMPLE_SIZE).collect(),
    }
}

/// Composes the chunker, an embedder and an index store.
///
/// Two concurrent runs for the same document are not serialized here;
/// callers own that.
#[derive(Clone)]
pub struct RagService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    config: RagConfig,
}

impl std::fmt::Debug for RagService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("provider", &self.embedder.provider())
            .field("dimensions", &self.store.dimensions())
            .field("config", &self.config)
            .finish()
    }
}

impl RagService {
    /// Wire the pipeline, refusing an embedder or store that disagrees
    /// with the configured provider
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        config: RagConfig,
    ) -> Result<Self> {
        let provider = embedder.provider();
        if provider != config.embedding_provider {
            return Err(RagError::Config(format!(
                "embedder uses {} but {} is configured",
                provider, config.embedding_provider
            )));
        }

        if store.dimensions() != provider.dimensions() {
            return Err(RagError::Config(format!(
                "index store holds {}-dimension vectors but {} produces {}",
                store.dimensions(),
                provider,
                provider.dimensions()
            )));
        }

        Ok(Self {
            embedder,
            store,
            config,
        })
    }

    /// Same collaborators, different retrieval settings
    #[inline]
    pub fn with_config(&self, config: RagConfig) -> Result<Self> {
        Self::new(Arc::clone(&self.embedder), Arc::clone(&self.store), config)
    }

    #[inline]
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Chunk, embed and store one document.
    ///
    /// Empty content is fatal. Per-item embedding failures and per-batch
    /// insert failures are reported in the returned stats.
    #[inline]
    pub async fn index_document(
        &self,
        input: &DocumentInput,
        observer: &dyn ProgressObserver,
    ) -> Result<IndexingStats> {
        observer.notify(IndexingProgress::new(
            IndexingPhase::Starting,
            0,
            format!("Starting indexing of {}", input.source_name),
        ));

        match self.run_indexing(input, observer).await {
            Ok(stats) => {
                observer.notify(IndexingProgress::new(
                    IndexingPhase::Completed,
                    100,
                    format!(
                        "Indexed {} of {} chunks",
                        stats.total_embeddings, stats.total_chunks
                    ),
                ));
                Ok(stats)
            }
            Err(e) => {
                error!("Indexing of {} failed: {}", input.document_id, e);
                observer.notify(IndexingProgress::new(
                    IndexingPhase::Error,
                    100,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn run_indexing(
        &self,
        input: &DocumentInput,
        observer: &dyn ProgressObserver,
    ) -> Result<IndexingStats> {
        let started = Instant::now();

        observer.notify(IndexingProgress::new(
            IndexingPhase::Chunking,
            10,
            "Splitting document into chunks",
        ));
        let chunks = chunk_document(
            &input.content,
            input.format,
            &input.source_name,
            &self.config.chunking,
        );
        if chunks.is_empty() {
            return Err(RagError::EmptyContent(format!(
                "{} produced no chunks",
                input.source_name
            )));
        }
        debug!("{} produced {} chunks", input.source_name, chunks.len());

        observer.notify(IndexingProgress::new(
            IndexingPhase::Embedding,
            30,
            format!("Generating embeddings for {} chunks", chunks.len()),
        ));
        let batch = self.embedder.embed_batch(&chunks).await;
        if batch.vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                batch.vectors.len(),
                chunks.len()
            )));
        }

        observer.notify(IndexingProgress::new(
            IndexingPhase::Saving,
            70,
            "Saving embeddings",
        ));
        let dimensions = self.store.dimensions();
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(batch.vectors)
            .filter(|(_, vector)| is_valid_embedding(vector, dimensions))
            .map(|(chunk, vector)| {
                EmbeddingRecord::from_chunk(&input.collection_id, &input.document_id, chunk, vector)
            })
            .collect();

        let skipped = chunks.len() - records.len();
        if skipped > 0 {
            warn!(
                "Skipping {} chunks of {} without a usable embedding",
                skipped, input.document_id
            );
        }

        let outcome =
            insert_in_batches(self.store.as_ref(), &records, self.config.insert_batch_size).await;

        let mut errors = batch.stats.errors;
        errors.extend(outcome.errors);

        let stats = IndexingStats {
            total_chunks: chunks.len(),
            total_embeddings: outcome.inserted_ids.len(),
            total_tokens: batch.stats.total_tokens,
            processing_time_ms: started.elapsed().as_millis() as u64,
            estimated_cost: batch.stats.estimated_cost,
            errors,
        };

        info!(
            "Indexed {}: {}/{} chunks stored, {} errors, ~{} tokens",
            input.document_id,
            stats.total_embeddings,
            stats.total_chunks,
            stats.errors.len(),
            stats.total_tokens
        );
        Ok(stats)
    }

    /// Delete a document's embeddings, then index it again.
    ///
    /// Not atomic: between the delete and the new inserts the document has
    /// no embeddings, and a crash in between leaves it empty until retried.
    #[inline]
    pub async fn reindex_document(
        &self,
        input: &DocumentInput,
        observer: &dyn ProgressObserver,
    ) -> Result<IndexingStats> {
        warn!(
            "Re-indexing {}: document is unsearchable until indexing completes",
            input.document_id
        );

        let deleted = self.store.delete_by_document(&input.document_id).await?;
        info!(
            "Removed {} existing embeddings for {}",
            deleted, input.document_id
        );

        self.index_document(input, observer).await
    }

    /// Embed the query and return ranked matches above the configured
    /// threshold. A failed query embedding fails the call.
    #[inline]
    pub async fn search_similar(
        &self,
        collection_id: &str,
        query: &str,
    ) -> Result<RagSearchResult> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyContent("search query is empty".to_string()));
        }

        let timeout = self.embedder.batch_settings().request_timeout;
        let vector = embed_with_timeout(self.embedder.as_ref(), query, timeout).await?;

        let dimensions = self.store.dimensions();
        if vector.len() != dimensions {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }
        if !is_valid_embedding(&vector, dimensions) {
            return Err(RagError::Embedding(
                "query embedding is zero or not finite".to_string(),
            ));
        }

        let threshold = self.config.similarity_threshold;
        let matches = self
            .store
            .query_nearest(collection_id, &vector, threshold, self.config.max_matches)
            .await?;

        debug!(
            "Query in {} matched {} chunks above {}",
            collection_id,
            matches.len(),
            threshold
        );

        Ok(RagSearchResult {
            total_matches: matches.len(),
            matches,
            threshold,
        })
    }

    /// Search and assemble `[Source N]` context blocks plus citations
    #[inline]
    pub async fn search_for_ai(&self, collection_id: &str, query: &str) -> Result<AiContext> {
        let started = Instant::now();
        let search_result = self.search_similar(collection_id, query).await?;

        let context = search_result
            .matches
            .iter()
            .enumerate()
            .map(|(i, m)| format!("[Source {}] {}", i + 1, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let sources = search_result
            .matches
            .iter()
            .enumerate()
            .map(|(i, m)| self.format_source(i + 1, m))
            .collect();

        let stats = RetrievalStats {
            processing_time_ms: started.elapsed().as_millis() as u64,
            total_matches: search_result.total_matches,
            top_similarity: search_result.matches.first().map(|m| m.similarity),
            context_characters: context.chars().count(),
        };

        Ok(AiContext {
            context,
            sources,
            search_result,
            stats,
        })
    }

    fn format_source(&self, number: usize, similarity_match: &SimilarityMatch) -> String {
        let metadata = &similarity_match.metadata;
        match metadata.section.as_deref() {
            Some(section) if self.config.include_metadata => {
                format!("Source {}: {} ({})", number, metadata.source_file, section)
            }
            _ => format!("Source {}: {}", number, metadata.source_file),
        }
    }

    /// True when the collection has stored embeddings. Storage errors count
    /// as "no embeddings".
    #[inline]
    pub async fn has_embeddings(&self, collection_id: &str) -> bool {
        match self.store.count_by_collection(collection_id).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(
                    "Could not count embeddings for {}, assuming none: {}",
                    collection_id, e
                );
                false
            }
        }
    }

    #[inline]
    pub fn preview_indexing(
        &self,
        content: &str,
        source_name: &str,
        format: FormatHint,
    ) -> IndexingPreview {
        preview_indexing(
            content,
            source_name,
            format,
            &self.config,
            &self.embedder.batch_settings(),
        )
    }

    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<u64> {
        self.store.delete_by_document(document_id).await
    }

    #[inline]
    pub async fn delete_collection(&self, collection_id: &str) -> Result<u64> {
        self.store.delete_by_collection(collection_id).await
    }

    /// Per-document totals for a collection. Storage errors yield empty
    /// stats.
    #[inline]
    pub async fn collection_stats(&self, collection_id: &str) -> CollectionStats {
        match self.store.stats_by_collection(collection_id).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    "Could not read stats for {}, reporting none: {}",
                    collection_id, e
                );
                CollectionStats::from_rows(collection_id, std::iter::empty())
            }
        }
    }
}
