// Database module
// Vector index stores (LanceDB, in-memory) and the SQLite document registry

pub mod lancedb;
pub mod memory;
pub mod sqlite;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embeddings::chunking::{Chunk, ChunkMetadata};
use crate::{RagError, Result};

pub use self::lancedb::LanceIndexStore;
pub use memory::MemoryIndexStore;
pub use sqlite::Database;

pub const DEFAULT_INSERT_BATCH_SIZE: usize = 50;

/// Persisted retrievable unit: one chunk and its vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub collection_id: String,
    pub document_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl EmbeddingRecord {
    #[inline]
    pub fn from_chunk(
        collection_id: &str,
        document_id: &str,
        chunk: &Chunk,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            vector,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A ranked query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// `1 - cosine distance`
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub document_id: String,
    pub embeddings: u64,
    pub total_characters: u64,
}

/// Aggregate counts for one collection, grouped by document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection_id: String,
    pub total_embeddings: u64,
    pub total_characters: u64,
    /// Sorted by document id
    pub documents: Vec<DocumentStats>,
}

impl CollectionStats {
    /// Fold `(document_id, content_length)` rows into per-document totals
    #[inline]
    pub fn from_rows<I>(collection_id: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut documents: std::collections::BTreeMap<String, DocumentStats> =
            std::collections::BTreeMap::new();

        for (document_id, characters) in rows {
            let entry = documents
                .entry(document_id.clone())
                .or_insert_with(|| DocumentStats {
                    document_id,
                    ..DocumentStats::default()
                });
            entry.embeddings += 1;
            entry.total_characters += characters;
        }

        let documents: Vec<DocumentStats> = documents.into_values().collect();
        Self {
            collection_id: collection_id.to_string(),
            total_embeddings: documents.iter().map(|d| d.embeddings).sum(),
            total_characters: documents.iter().map(|d| d.total_characters).sum(),
            documents,
        }
    }
}

/// Result of a bounded-batch bulk insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted_ids: Vec<String>,
    pub errors: Vec<String>,
}

/// Storage collaborator holding embedding records.
///
/// Every read is scoped to one collection. Deletes are idempotent and report
/// how many records were removed.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Vector width accepted by this store
    fn dimensions(&self) -> usize;

    /// Insert one batch; the batch is rejected as a whole on any invalid record
    async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>>;

    /// Up to `limit` matches with `similarity > threshold`, best first
    async fn query_nearest(
        &self,
        collection_id: &str,
        query_vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>>;

    async fn delete_by_document(&self, document_id: &str) -> Result<u64>;

    async fn delete_by_collection(&self, collection_id: &str) -> Result<u64>;

    async fn count_by_collection(&self, collection_id: &str) -> Result<u64>;

    async fn stats_by_collection(&self, collection_id: &str) -> Result<CollectionStats>;
}

/// Reject records whose vector width differs from the store's
#[inline]
pub fn validate_dimensions(records: &[EmbeddingRecord], dimensions: usize) -> Result<()> {
    match records.iter().find(|r| r.vector.len() != dimensions) {
        Some(record) => Err(RagError::DimensionMismatch {
            expected: dimensions,
            actual: record.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Insert records in bounded batches. A failing batch is recorded and
/// skipped; the remaining batches are still attempted.
#[inline]
pub async fn insert_in_batches<S>(
    store: &S,
    records: &[EmbeddingRecord],
    batch_size: usize,
) -> InsertOutcome
where
    S: IndexStore + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut outcome = InsertOutcome::default();

    for (batch_index, batch) in records.chunks(batch_size).enumerate() {
        match store.insert_batch(batch).await {
            Ok(ids) => {
                debug!(
                    "Inserted batch {} ({} records)",
                    batch_index + 1,
                    ids.len()
                );
                outcome.inserted_ids.extend(ids);
            }
            Err(e) => {
                let message = format!("Insert batch {} failed: {}", batch_index + 1, e);
                warn!("{}", message);
                outcome.errors.push(message);
            }
        }
    }

    outcome
}
