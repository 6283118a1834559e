#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

const DOCUMENT_COLUMNS: &str = "id, collection_id, source_name, file_type, status, total_chunks, \
     total_embeddings, estimated_cost, error_message, created_date, indexed_date";

pub struct DocumentQueries;

impl DocumentQueries {
    /// Register a document. An existing id is reset to `pending` with its
    /// counts from the previous run cleared.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection_id, source_name, file_type, status, created_date)
            VALUES (?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(id) DO UPDATE SET
                collection_id = excluded.collection_id,
                source_name = excluded.source_name,
                file_type = excluded.file_type,
                status = 'pending',
                total_chunks = 0,
                total_embeddings = 0,
                estimated_cost = 0,
                error_message = NULL,
                indexed_date = NULL
            "#,
        )
        .bind(&new_document.id)
        .bind(&new_document.collection_id)
        .bind(&new_document.source_name)
        .bind(&new_document.file_type)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to register document")?;

        Self::get_by_id(pool, &new_document.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve registered document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Document>> {
        let query = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        let result = sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get document by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_by_collection(
        pool: &SqlitePool,
        collection_id: &str,
    ) -> Result<Vec<Document>> {
        let query = format!(
            "SELECT {} FROM documents WHERE collection_id = ? ORDER BY created_date DESC, id",
            DOCUMENT_COLUMNS
        );
        let documents = sqlx::query_as::<_, Document>(&query)
            .bind(collection_id)
            .fetch_all(pool)
            .await
            .context("Failed to list documents")?;

        debug!(
            "Found {} documents in collection {}",
            documents.len(),
            collection_id
        );
        Ok(documents)
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<Document>> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE documents SET ");
        let mut has_fields = false;

        {
            let mut fields = builder.separated(", ");

            if let Some(status) = update.status {
                fields.push("status = ").push_bind_unseparated(status.as_str());
                has_fields = true;
            }

            if let Some(total) = update.total_chunks {
                fields.push("total_chunks = ").push_bind_unseparated(total);
                has_fields = true;
            }

            if let Some(total) = update.total_embeddings {
                fields.push("total_embeddings = ").push_bind_unseparated(total);
                has_fields = true;
            }

            if let Some(cost) = update.estimated_cost {
                fields.push("estimated_cost = ").push_bind_unseparated(cost);
                has_fields = true;
            }

            if let Some(error) = update.error_message {
                fields.push("error_message = ").push_bind_unseparated(error);
                has_fields = true;
            }

            if let Some(indexed_date) = update.indexed_date {
                fields.push("indexed_date = ").push_bind_unseparated(indexed_date);
                has_fields = true;
            }
        }

        if !has_fields {
            return Self::get_by_id(pool, id).await;
        }

        builder.push(" WHERE id = ").push_bind(id.to_string());
        builder
            .build()
            .execute(pool)
            .await
            .context("Failed to update document")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete_by_collection(pool: &SqlitePool, collection_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE collection_id = ?")
            .bind(collection_id)
            .execute(pool)
            .await
            .context("Failed to delete collection documents")?;

        Ok(result.rows_affected())
    }
}
