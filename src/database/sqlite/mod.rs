use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{Document, DocumentStatus, DocumentUpdate, NewDocument};
use crate::database::sqlite::queries::DocumentQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Registry of documents and the outcome of their last indexing run
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    #[inline]
    pub async fn register_document(&self, document: NewDocument) -> Result<Document> {
        DocumentQueries::upsert(&self.pool, document).await
    }

    #[inline]
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        DocumentQueries::list_by_collection(&self.pool, collection_id).await
    }

    #[inline]
    pub async fn mark_indexing(&self, id: &str) -> Result<Option<Document>> {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Indexing),
            ..DocumentUpdate::default()
        };
        DocumentQueries::update(&self.pool, id, update).await
    }

    #[inline]
    pub async fn mark_completed(
        &self,
        id: &str,
        total_chunks: usize,
        total_embeddings: usize,
        estimated_cost: f64,
    ) -> Result<Option<Document>> {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Completed),
            total_chunks: Some(i64::try_from(total_chunks).context("chunk count overflow")?),
            total_embeddings: Some(
                i64::try_from(total_embeddings).context("embedding count overflow")?,
            ),
            estimated_cost: Some(estimated_cost),
            indexed_date: Some(Utc::now().naive_utc()),
            ..DocumentUpdate::default()
        };
        DocumentQueries::update(&self.pool, id, update).await
    }

    #[inline]
    pub async fn mark_failed(&self, id: &str, error_message: &str) -> Result<Option<Document>> {
        let update = DocumentUpdate {
            status: Some(DocumentStatus::Failed),
            error_message: Some(error_message.to_string()),
            ..DocumentUpdate::default()
        };
        DocumentQueries::update(&self.pool, id, update).await
    }

    #[inline]
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        DocumentQueries::delete(&self.pool, id).await
    }

    #[inline]
    pub async fn delete_collection(&self, collection_id: &str) -> Result<u64> {
        DocumentQueries::delete_by_collection(&self.pool, collection_id).await
    }
}
