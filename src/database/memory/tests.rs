use super::*;
use crate::RagError;
use crate::embeddings::chunking::ChunkMetadata;

fn record(id: &str, collection: &str, document: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: id.to_string(),
        collection_id: collection.to_string(),
        document_id: document.to_string(),
        content: format!("content of {}", id),
        metadata: ChunkMetadata {
            chunk_index: 0,
            source_file: format!("{}.txt", document),
            file_type: "text".to_string(),
            section: Some("Characters 0-10".to_string()),
            line_start: None,
            line_end: None,
            page_number: None,
            columns: None,
            tokens: 3,
        },
        vector,
        created_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

async fn seeded_store() -> MemoryIndexStore {
    let store = MemoryIndexStore::new(3);
    store
        .insert_batch(&[
            record("a1", "alpha", "doc-1", vec![1.0, 0.0, 0.0]),
            record("a2", "alpha", "doc-1", vec![0.8, 0.6, 0.0]),
            record("a3", "alpha", "doc-2", vec![0.0, 1.0, 0.0]),
            record("b1", "beta", "doc-3", vec![1.0, 0.0, 0.0]),
        ])
        .await
        .expect("seed insert should succeed");
    store
}

#[tokio::test]
async fn insert_returns_ids_in_order() {
    let store = MemoryIndexStore::new(3);
    let ids = store
        .insert_batch(&[
            record("x", "c", "d", vec![1.0, 0.0, 0.0]),
            record("y", "c", "d", vec![0.0, 1.0, 0.0]),
        ])
        .await
        .expect("insert should succeed");

    assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn dimension_mismatch_rejects_whole_batch() {
    let store = MemoryIndexStore::new(3);
    let result = store
        .insert_batch(&[
            record("ok", "c", "d", vec![1.0, 0.0, 0.0]),
            record("bad", "c", "d", vec![1.0, 0.0]),
        ])
        .await;

    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn query_ranks_and_filters_by_threshold() {
    let store = seeded_store().await;

    let matches = store
        .query_nearest("alpha", &[1.0, 0.0, 0.0], 0.5, 10)
        .await
        .expect("query should succeed");

    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert!((matches[0].similarity - 1.0).abs() < 1e-6);
    assert!((matches[1].similarity - 0.8).abs() < 1e-6);
    assert!(matches.iter().all(|m| m.similarity > 0.5));
}

#[tokio::test]
async fn threshold_is_strict() {
    let store = seeded_store().await;

    let matches = store
        .query_nearest("alpha", &[1.0, 0.0, 0.0], 0.8, 10)
        .await
        .expect("query should succeed");

    // a2 scores 0.8 (up to float rounding) and must not pass a 0.8 threshold
    assert!(matches.iter().all(|m| m.similarity > 0.8));
    assert_eq!(matches[0].id, "a1");
}

#[tokio::test]
async fn query_respects_limit() {
    let store = seeded_store().await;

    let matches = store
        .query_nearest("alpha", &[1.0, 1.0, 0.0], 0.0, 1)
        .await
        .expect("query should succeed");

    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn collections_are_isolated() {
    let store = seeded_store().await;

    let matches = store
        .query_nearest("beta", &[1.0, 0.0, 0.0], 0.0, 10)
        .await
        .expect("query should succeed");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "b1");

    let none = store
        .query_nearest("gamma", &[1.0, 0.0, 0.0], 0.0, 10)
        .await
        .expect("query should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn query_vector_width_is_checked() {
    let store = seeded_store().await;
    let result = store.query_nearest("alpha", &[1.0, 0.0], 0.0, 10).await;
    assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
}

#[tokio::test]
async fn deletes_are_counted_and_idempotent() {
    let store = seeded_store().await;

    assert_eq!(
        store
            .delete_by_document("doc-1")
            .await
            .expect("delete should succeed"),
        2
    );
    assert_eq!(
        store
            .delete_by_document("doc-1")
            .await
            .expect("repeat delete should succeed"),
        0
    );
    assert_eq!(
        store
            .delete_by_document("never-existed")
            .await
            .expect("unknown delete should succeed"),
        0
    );
    assert_eq!(
        store
            .delete_by_collection("beta")
            .await
            .expect("delete should succeed"),
        1
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn counts_and_stats_group_by_document() {
    let store = seeded_store().await;

    assert_eq!(
        store
            .count_by_collection("alpha")
            .await
            .expect("count should succeed"),
        3
    );

    let stats = store
        .stats_by_collection("alpha")
        .await
        .expect("stats should succeed");
    assert_eq!(stats.total_embeddings, 3);
    assert_eq!(stats.documents.len(), 2);
    assert_eq!(stats.documents[0].document_id, "doc-1");
    assert_eq!(stats.documents[0].embeddings, 2);
    assert_eq!(stats.documents[1].document_id, "doc-2");
    assert_eq!(
        stats.total_characters,
        ("content of a1".len() * 3) as u64
    );
}

#[tokio::test]
async fn similarity_never_drops_below_zero() {
    let store = MemoryIndexStore::new(3);
    store
        .insert_batch(&[record("o1", "opposite", "doc-9", vec![-1.0, 0.0, 0.0])])
        .await
        .expect("insert should succeed");

    let results = store
        .query_nearest("opposite", &[1.0, 0.0, 0.0], -1.0, 10)
        .await
        .expect("query should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].similarity, 0.0);
}
