
use super::{DISTANCE_COLUMN, TABLE_NAME, VECTOR_COLUMN, embeddings_schema, eq_predicate};
use crate::database::{
    CollectionStats, EmbeddingRecord, IndexStore, SimilarityMatch, validate_dimensions,
};
use crate::embeddings::chunking::ChunkMetadata;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    arrow::SendableRecordBatchStream,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Index store backed by a LanceDB table on local disk
pub struct LanceIndexStore {
    connection: Connection,
    dimensions: usize,
}

impl LanceIndexStore {
    /// Open (or create) the embeddings table under `path`.
    ///
    /// An existing table with a different vector width is refused rather
    /// than dropped.
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.display().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            dimensions,
        };
        store.initialize_table().await?;

        info!(
            "Vector store initialized at {} ({} dimensions)",
            uri, dimensions
        );
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.iter().any(|name| name == TABLE_NAME) {
            let table = self.open_table().await?;
            let schema = table
                .schema()
                .await
                .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

            return match super::schema_dimensions(&schema) {
                Some(existing) if existing == self.dimensions => {
                    debug!("Embeddings table exists with {} dimensions", existing);
                    Ok(())
                }
                Some(existing) => Err(RagError::Config(format!(
                    "vector index holds {}-dimension embeddings but the configured provider produces {}; delete the index or switch providers",
                    existing, self.dimensions
                ))),
                None => Err(RagError::Database(
                    "Could not find vector column in embeddings table".to_string(),
                )),
            };
        }

        let schema = embeddings_schema(self.dimensions)?;
        self.connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Embeddings table created with {} dimensions",
            self.dimensions
        );
        Ok(())
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut collection_ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut metadata = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimensions);

        for record in records {
            ids.push(record.id.as_str());
            collection_ids.push(record.collection_id.as_str());
            document_ids.push(record.document_id.as_str());
            chunk_indices.push(u32::try_from(record.metadata.chunk_index).map_err(|_| {
                RagError::Database(format!(
                    "chunk index {} out of range",
                    record.metadata.chunk_index
                ))
            })?);
            contents.push(record.content.as_str());
            metadata.push(serde_json::to_string(&record.metadata).map_err(|e| {
                RagError::Database(format!("Failed to serialize chunk metadata: {}", e))
            })?);
            created_ats.push(record.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let schema = embeddings_schema(self.dimensions)?;
        let width = i32::try_from(self.dimensions)
            .map_err(|_| RagError::Config(format!("vector width {} is too large", self.dimensions)))?;

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            width,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(collection_ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    async fn count_where(&self, predicate: &str) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(Some(predicate.to_string()))
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    async fn delete_where(&self, predicate: &str) -> Result<u64> {
        let count = self.count_where(predicate).await?;
        if count == 0 {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .delete(predicate)
            .await
            .map_err(|e| RagError::Database(format!("Failed to delete embeddings: {}", e)))?;

        info!("Deleted {} embeddings where {}", count, predicate);
        Ok(count)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

/// Convert one batch of vector-search rows into matches
fn parse_matches(batch: &RecordBatch) -> Result<Vec<SimilarityMatch>> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| RagError::Database("Missing distance column".to_string()))?;

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let chunk_metadata: ChunkMetadata = serde_json::from_str(metadata.value(row))
            .map_err(|e| RagError::Database(format!("Corrupt chunk metadata: {}", e)))?;
        let distance = if distances.is_null(row) {
            1.0
        } else {
            distances.value(row)
        };

        matches.push(SimilarityMatch {
            id: ids.value(row).to_string(),
            content: contents.value(row).to_string(),
            metadata: chunk_metadata,
            // cosine distance spans 0..=2
            similarity: (1.0 - distance).clamp(0.0, 1.0),
        });
    }

    Ok(matches)
}

async fn collect_batches(mut stream: SendableRecordBatchStream) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
    {
        batches.push(batch);
    }
    Ok(batches)
}

#[async_trait]
impl IndexStore for LanceIndexStore {
    #[inline]
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<Vec<String>> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(Vec::new());
        }
        validate_dimensions(records, self.dimensions)?;

        let record_batch = self.create_record_batch(records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert embeddings: {}", e)))?;

        debug!("Stored {} embeddings", records.len());
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
        if query_vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Searching collection {} (threshold {}, limit {})",
            collection_id, threshold, limit
        );

        let table = self.open_table().await?;
        let stream = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .only_if(eq_predicate("collection_id", collection_id))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut matches = Vec::new();
        for batch in collect_batches(stream).await? {
            matches.extend(
                parse_matches(&batch)?
                    .into_iter()
                    .filter(|m| m.similarity > threshold),
            );
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        debug!("Found {} matches above threshold", matches.len());
        Ok(matches)
    }

    #[inline]
    async fn delete_by_document(&self, document_id: &str) -> Result<u64> {
        self.delete_where(&eq_predicate("document_id", document_id))
            .await
    }

    #[inline]
    async fn delete_by_collection(&self, collection_id: &str) -> Result<u64> {
        self.delete_where(&eq_predicate("collection_id", collection_id))
            .await
    }

    #[inline]
    async fn count_by_collection(&self, collection_id: &str) -> Result<u64> {
        self.count_where(&eq_predicate("collection_id", collection_id))
            .await
    }

    #[inline]
    async fn stats_by_collection(&self, collection_id: &str) -> Result<CollectionStats> {
        let predicate = eq_predicate("collection_id", collection_id);
        let total = self.count_where(&predicate).await?;
        if total == 0 {
            return Ok(CollectionStats::from_rows(collection_id, Vec::new()));
        }

        let table = self.open_table().await?;
        let stream = table
            .query()
            .only_if(predicate)
            .select(Select::columns(&["document_id", "content"]))
            .limit(usize::try_from(total).unwrap_or(usize::MAX))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to query collection: {}", e)))?;

        let mut rows = Vec::new();
        for batch in collect_batches(stream).await? {
            let documents = string_column(&batch, "document_id")?;
            let contents = string_column(&batch, "content")?;
            for row in 0..batch.num_rows() {
                rows.push((
                    documents.value(row).to_string(),
                    contents.value(row).chars().count() as u64,
                ));
            }
        }

        Ok(CollectionStats::from_rows(collection_id, rows))
    }
}
