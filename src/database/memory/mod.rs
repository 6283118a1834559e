// In-process index store
// Brute-force cosine search over records held behind a lock

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    CollectionStats, EmbeddingRecord, IndexStore, SimilarityMatch, validate_dimensions,
};
use crate::Result;
use crate::embeddings::vectors::cosine_similarity;

#[derive(Debug)]
pub struct MemoryIndexStore {
    dimensions: usize,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryIndexStore {
    #[inline]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Total records across all collections
    #[inline]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn delete_where<F>(&self, predicate: F) -> u64
    where
        F: Fn(&EmbeddingRecord) -> bool,
    {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !predicate(record));
        (before - records.len()) as u64
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    #[inline]
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        validate_dimensions(records, self.dimensions)?;

        let mut stored = self.records.write().await;
        stored.extend(records.iter().cloned());
        debug!("Stored {} records in memory", records.len());

        Ok(records.iter().map(|r| r.id.clone()).collect())
    }

    #[inline]
    async fn query_nearest(
        &self,
        collection_id: &str,
        query_vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        let records = self.records.read().await;

        let mut matches = Vec::new();
        for record in records.iter().filter(|r| r.collection_id == collection_id) {
            let similarity = cosine_similarity(&record.vector, query_vector)?.clamp(0.0, 1.0);
            if similarity > threshold {
                matches.push(SimilarityMatch {
                    id: record.id.clone(),
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    similarity,
                });
            }
        }

        // stable sort keeps insertion order among equal scores
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    #[inline]
    async fn delete_by_document(&self, document_id: &str) -> Result<u64> {
        Ok(self.delete_where(|r| r.document_id == document_id).await)
    }

    #[inline]
    async fn delete_by_collection(&self, collection_id: &str) -> Result<u64> {
        Ok(self.delete_where(|r| r.collection_id == collection_id).await)
    }

    #[inline]
    async fn count_by_collection(&self, collection_id: &str) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.collection_id == collection_id)
            .count() as u64)
    }

    #[inline]
    async fn stats_by_collection(&self, collection_id: &str) -> Result<CollectionStats> {
        let records = self.records.read().await;
        let rows = records
            .iter()
            .filter(|r| r.collection_id == collection_id)
            .map(|r| (r.document_id.clone(), r.content.chars().count() as u64));
        Ok(CollectionStats::from_rows(collection_id, rows))
    }
}
