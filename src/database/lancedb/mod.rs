// LanceDB vector database module
// Table layout and filter helpers for the embeddings table


pub mod vector_store;

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

use crate::{RagError, Result};

pub use vector_store::LanceIndexStore;

pub const TABLE_NAME: &str = "embeddings";
pub const VECTOR_COLUMN: &str = "vector";
pub const DISTANCE_COLUMN: &str = "_distance";

/// Schema of the embeddings table for the given vector width
#[inline]
pub fn embeddings_schema(dimensions: usize) -> Result<Arc<Schema>> {
    let width = i32::try_from(dimensions)
        .map_err(|_| RagError::Config(format!("vector width {} is too large", dimensions)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                width,
            ),
            false,
        ),
        Field::new("collection_id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

/// Vector width declared by an existing schema, if it has a vector column
#[inline]
pub fn schema_dimensions(schema: &Schema) -> Option<usize> {
    schema
        .fields()
        .iter()
        .find(|field| field.name() == VECTOR_COLUMN)
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}

/// SQL equality predicate with the value quoted as a string literal
#[inline]
pub fn eq_predicate(column: &str, value: &str) -> String {
    format!("{} = '{}'", column, value.replace('\'', "''"))
}
