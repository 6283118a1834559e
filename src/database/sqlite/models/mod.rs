
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// A document registered for indexing in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub collection_id: String,
    pub source_name: String,
    pub file_type: String,
    pub status: DocumentStatus,
    pub total_chunks: i64,
    pub total_embeddings: i64,
    pub estimated_cost: f64,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub indexed_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Indexing,
    Completed,
    Failed,
}

impl DocumentStatus {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Indexing => "indexing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Pending => write!(f, "Pending"),
            DocumentStatus::Indexing => write!(f, "Indexing"),
            DocumentStatus::Completed => write!(f, "Completed"),
            DocumentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub collection_id: String,
    pub source_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocumentUpdate {
    pub status: Option<DocumentStatus>,
    pub total_chunks: Option<i64>,
    pub total_embeddings: Option<i64>,
    pub estimated_cost: Option<f64>,
    pub error_message: Option<String>,
    pub indexed_date: Option<NaiveDateTime>,
}

impl Document {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == DocumentStatus::Failed
    }

    /// True when some chunks were never stored
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.is_completed() && self.total_embeddings < self.total_chunks
    }
}
