use super::*;
use crate::database::sqlite::Database;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

fn new_document(id: &str, collection: &str) -> NewDocument {
    NewDocument {
        id: id.to_string(),
        collection_id: collection.to_string(),
        source_name: format!("{}.txt", id),
        file_type: "text".to_string(),
    }
}

#[tokio::test]
async fn upsert_creates_pending_document() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = DocumentQueries::upsert(database.pool(), new_document("doc-1", "gem")).await?;

    assert_eq!(document.id, "doc-1");
    assert_eq!(document.collection_id, "gem");
    assert_eq!(document.status, DocumentStatus::Pending);
    assert_eq!(document.total_chunks, 0);
    assert!(document.indexed_date.is_none());
    Ok(())
}

#[tokio::test]
async fn upsert_resets_existing_document() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let pool = database.pool();

    let original = DocumentQueries::upsert(pool, new_document("doc-1", "gem")).await?;
    DocumentQueries::update(
        pool,
        "doc-1",
        DocumentUpdate {
            status: Some(DocumentStatus::Completed),
            total_chunks: Some(8),
            total_embeddings: Some(7),
            estimated_cost: Some(0.004),
            error_message: Some("Batch 1: chunk 3 failed".to_string()),
            indexed_date: Some(Utc::now().naive_utc()),
            ..DocumentUpdate::default()
        },
    )
    .await?;

    let mut replacement = new_document("doc-1", "gem");
    replacement.source_name = "renamed.txt".to_string();
    let reset = DocumentQueries::upsert(pool, replacement).await?;

    assert_eq!(reset.status, DocumentStatus::Pending);
    assert_eq!(reset.error_message, None);
    assert_eq!(reset.total_chunks, 0);
    assert_eq!(reset.total_embeddings, 0);
    assert_eq!(reset.estimated_cost, 0.0);
    assert!(reset.indexed_date.is_none());
    assert_eq!(reset.source_name, "renamed.txt");
    assert_eq!(reset.created_date, original.created_date);
    Ok(())
}

#[tokio::test]
async fn update_only_touches_given_fields() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let pool = database.pool();
    DocumentQueries::upsert(pool, new_document("doc-1", "gem")).await?;

    let now = Utc::now().naive_utc();
    let updated = DocumentQueries::update(
        pool,
        "doc-1",
        DocumentUpdate {
            status: Some(DocumentStatus::Completed),
            total_chunks: Some(12),
            total_embeddings: Some(11),
            estimated_cost: Some(0.0025),
            indexed_date: Some(now),
            ..DocumentUpdate::default()
        },
    )
    .await?
    .expect("document should exist");

    assert_eq!(updated.status, DocumentStatus::Completed);
    assert_eq!(updated.total_chunks, 12);
    assert_eq!(updated.total_embeddings, 11);
    assert!((updated.estimated_cost - 0.0025).abs() < f64::EPSILON);
    assert!(updated.indexed_date.is_some());
    assert_eq!(updated.source_name, "doc-1.txt");

    let unchanged = DocumentQueries::update(pool, "doc-1", DocumentUpdate::default())
        .await?
        .expect("document should exist");
    assert_eq!(unchanged, updated);

    let missing = DocumentQueries::update(
        pool,
        "nope",
        DocumentUpdate {
            status: Some(DocumentStatus::Failed),
            ..DocumentUpdate::default()
        },
    )
    .await?;
    assert!(missing.is_none());
    Ok(())
}

#[tokio::test]
async fn list_is_scoped_to_collection() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let pool = database.pool();
    DocumentQueries::upsert(pool, new_document("a", "gem-1")).await?;
    DocumentQueries::upsert(pool, new_document("b", "gem-1")).await?;
    DocumentQueries::upsert(pool, new_document("c", "gem-2")).await?;

    let documents = DocumentQueries::list_by_collection(pool, "gem-1").await?;
    let mut ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b"]);

    assert!(
        DocumentQueries::list_by_collection(pool, "empty")
            .await?
            .is_empty()
    );
    Ok(())
}

#[tokio::test]
async fn deletes() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let pool = database.pool();
    DocumentQueries::upsert(pool, new_document("a", "gem-1")).await?;
    DocumentQueries::upsert(pool, new_document("b", "gem-1")).await?;
    DocumentQueries::upsert(pool, new_document("c", "gem-2")).await?;

    assert!(DocumentQueries::delete(pool, "c").await?);
    assert!(!DocumentQueries::delete(pool, "c").await?);
    assert_eq!(DocumentQueries::delete_by_collection(pool, "gem-1").await?, 2);
    assert_eq!(DocumentQueries::delete_by_collection(pool, "gem-1").await?, 0);
    Ok(())
}
