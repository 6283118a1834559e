use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::sqlite::models::{DocumentStatus, NewDocument};
use crate::database::{Database, IndexStore, LanceIndexStore};
use crate::embeddings::{FormatHint, GeminiEmbedder};
use crate::generation::{GeminiChatClient, GenerationService};
use crate::rag::{
    DocumentInput, IndexingPhase, IndexingProgress, IndexingStats, RagService, preview_indexing,
};

/// Open the vector index for the configured provider
#[inline]
pub async fn open_index_store(config: &Config) -> Result<LanceIndexStore> {
    let dimensions = config.rag.embedding_provider.dimensions();
    LanceIndexStore::open(config.vector_database_path(), dimensions)
        .await
        .context("Failed to open vector database")
}

/// Wire the configured embedder and vector index into a retrieval service
#[inline]
pub async fn open_rag_service(config: &Config) -> Result<RagService> {
    let embedder = GeminiEmbedder::new(&config.embedding, config.rag.embedding_provider)?;
    let store = open_index_store(config).await?;
    let service = RagService::new(Arc::new(embedder), Arc::new(store), config.rag.clone())?;
    Ok(service)
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize document registry")
}

async fn read_document(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn progress_bar() -> Result<ProgressBar> {
    if !console::user_attended_stderr() {
        return Ok(ProgressBar::hidden());
    }

    let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos:>3}% {msg}")
        .context("Invalid progress bar template")?
        .progress_chars("=> ");
    Ok(ProgressBar::new(100).with_style(style))
}

fn spawn_progress_renderer(
    mut rx: UnboundedReceiver<IndexingProgress>,
    bar: ProgressBar,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut failed = false;
        while let Some(progress) = rx.recv().await {
            bar.set_position(u64::from(progress.progress));
            failed = progress.phase == IndexingPhase::Error;
            bar.set_message(format!("{}: {}", progress.phase, progress.message));
        }

        if failed {
            bar.abandon();
        } else {
            bar.finish_and_clear();
        }
    })
}

/// Index a file into a collection and record the outcome in the registry
#[inline]
pub async fn index_file(
    config: &Config,
    collection_id: &str,
    path: &Path,
    document_id: Option<String>,
    format: Option<FormatHint>,
) -> Result<IndexingStats> {
    let document_id = document_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    run_indexing(config, collection_id, &document_id, path, format, false).await
}

/// Replace a document's embeddings with a fresh indexing run
#[inline]
pub async fn reindex_file(
    config: &Config,
    collection_id: &str,
    document_id: &str,
    path: &Path,
    format: Option<FormatHint>,
) -> Result<IndexingStats> {
    run_indexing(config, collection_id, document_id, path, format, true).await
}

async fn run_indexing(
    config: &Config,
    collection_id: &str,
    document_id: &str,
    path: &Path,
    format: Option<FormatHint>,
    replace: bool,
) -> Result<IndexingStats> {
    let content = read_document(path).await?;
    let format = format.unwrap_or_else(|| FormatHint::from_path(path));
    let source_name = source_name(path);

    let rag = open_rag_service(config).await?;
    let database = open_database(config).await?;

    database
        .register_document(NewDocument {
            id: document_id.to_string(),
            collection_id: collection_id.to_string(),
            source_name: source_name.clone(),
            file_type: format.as_str().to_string(),
        })
        .await?;
    database.mark_indexing(document_id).await?;

    let input = DocumentInput {
        collection_id: collection_id.to_string(),
        document_id: document_id.to_string(),
        content,
        source_name,
        format,
    };

    info!(
        "Indexing {} into {} as {}",
        path.display(),
        collection_id,
        document_id
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = spawn_progress_renderer(rx, progress_bar()?);

    let result = if replace {
        rag.reindex_document(&input, &tx).await
    } else {
        rag.index_document(&input, &tx).await
    };
    drop(tx);
    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped: {}", e);
    }

    match result {
        Ok(stats) => {
            database
                .mark_completed(
                    document_id,
                    stats.total_chunks,
                    stats.total_embeddings,
                    stats.estimated_cost,
                )
                .await?;

            println!("Indexed {} (document ID: {})", input.source_name, document_id);
            println!(
                "  Chunks: {}  Stored: {}  Tokens: ~{}",
                stats.total_chunks, stats.total_embeddings, stats.total_tokens
            );
            println!(
                "  Estimated cost: ${:.6}  Time: {} ms",
                stats.estimated_cost, stats.processing_time_ms
            );
            if !stats.errors.is_empty() {
                println!("  {} problems:", stats.errors.len());
                for message in &stats.errors {
                    println!("    - {}", message);
                }
            }
            Ok(stats)
        }
        Err(e) => {
            error!("Indexing {} failed: {}", document_id, e);
            database.mark_failed(document_id, &e.to_string()).await?;
            Err(e.into())
        }
    }
}

/// Show how a file would be chunked and what embedding it would cost
#[inline]
pub async fn preview_file(config: &Config, path: &Path, format: Option<FormatHint>) -> Result<()> {
    let content = read_document(path).await?;
    let format = format.unwrap_or_else(|| FormatHint::from_path(path));

    let preview = preview_indexing(
        &content,
        &source_name(path),
        format,
        &config.rag,
        &config.embedding.batch_settings(),
    );

    println!("Preview of {} ({})", path.display(), format);
    println!("  Chunks: {}", preview.total_chunks);
    println!("  Estimated tokens: {}", preview.estimated_tokens);
    println!("  Estimated cost: ${:.6}", preview.estimated_cost);
    println!("  Estimated time: {}", preview.estimated_time);

    for chunk in &preview.sample_chunks {
        println!();
        println!(
            "--- chunk {} ({}, ~{} tokens) ---",
            chunk.metadata.chunk_index,
            chunk.metadata.section.as_deref().unwrap_or("no section"),
            chunk.metadata.tokens
        );
        println!("{}", chunk.content);
    }

    Ok(())
}

/// Print the ranked matches for a query
#[inline]
pub async fn search(config: &Config, collection_id: &str, query: &str) -> Result<()> {
    let rag = open_rag_service(config).await?;
    let result = rag.search_similar(collection_id, query).await?;

    if result.matches.is_empty() {
        println!(
            "No matches above similarity {} in {}",
            result.threshold, collection_id
        );
        return Ok(());
    }

    println!(
        "{} matches above similarity {}:",
        result.total_matches, result.threshold
    );
    for (i, similarity_match) in result.matches.iter().enumerate() {
        let metadata = &similarity_match.metadata;
        println!();
        println!(
            "{}. {:.3}  {}{}",
            i + 1,
            similarity_match.similarity,
            metadata.source_file,
            metadata
                .section
                .as_deref()
                .map(|section| format!(" ({})", section))
                .unwrap_or_default()
        );
        println!("   {}", similarity_match.content.replace('\n', "\n   "));
    }

    Ok(())
}

/// Answer a message, grounded in the collection when possible
#[inline]
pub async fn ask(
    config: &Config,
    collection_id: &str,
    message: &str,
    system_prompt: &str,
) -> Result<()> {
    let chat = GeminiChatClient::new(&config.embedding, &config.generation)?;
    let rag = match open_rag_service(config).await {
        Ok(rag) => Some(rag),
        Err(e) => {
            warn!("Retrieval unavailable, answering without context: {:#}", e);
            None
        }
    };

    let reply = GenerationService::new(Arc::new(chat), rag)
        .respond(collection_id, system_prompt, message)
        .await?;

    println!("{}", reply.text);
    if reply.grounded {
        println!();
        println!("Sources:");
        for source in &reply.sources {
            println!("  {}", source);
        }
    }

    Ok(())
}

/// Remove a document's embeddings and its registry entry
#[inline]
pub async fn delete_document(config: &Config, document_id: &str) -> Result<()> {
    let store = open_index_store(config).await?;
    let database = open_database(config).await?;

    let removed = store.delete_by_document(document_id).await?;
    let registered = database.delete_document(document_id).await?;

    if removed == 0 && !registered {
        println!("No document found with ID {}", document_id);
    } else {
        println!(
            "Deleted document {} ({} embeddings removed)",
            document_id, removed
        );
    }
    Ok(())
}

/// Remove every embedding and registry entry of a collection
#[inline]
pub async fn delete_collection(config: &Config, collection_id: &str) -> Result<()> {
    let store = open_index_store(config).await?;
    let database = open_database(config).await?;

    let removed = store.delete_by_collection(collection_id).await?;
    let documents = database.delete_collection(collection_id).await?;

    println!(
        "Deleted collection {}: {} documents, {} embeddings",
        collection_id, documents, removed
    );
    Ok(())
}

/// Show registry and index state for a collection
#[inline]
pub async fn show_status(config: &Config, collection_id: &str) -> Result<()> {
    println!("📊 gem-rag Status: {}", collection_id);
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedding provider: {}", config.rag.embedding_provider);
    println!(
        "   Retrieval: {} (threshold {}, max {} matches)",
        if config.rag.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.rag.similarity_threshold,
        config.rag.max_matches
    );

    println!();
    println!("🔍 Vector Index:");
    match open_index_store(config).await {
        Ok(store) => match store.stats_by_collection(collection_id).await {
            Ok(stats) => {
                println!("   Embeddings: {}", stats.total_embeddings);
                println!("   Characters: {}", stats.total_characters);
                for document in &stats.documents {
                    println!(
                        "   - {}: {} embeddings, {} characters",
                        document.document_id, document.embeddings, document.total_characters
                    );
                }
            }
            Err(e) => println!("   ❌ Failed to read statistics: {}", e),
        },
        Err(e) => println!("   ❌ Failed to open: {:#}", e),
    }

    println!();
    println!("📚 Documents:");
    let database = open_database(config).await?;
    let documents = database.list_documents(collection_id).await?;
    if documents.is_empty() {
        println!("   📭 No documents registered");
    }
    for document in &documents {
        let marker = match document.status {
            DocumentStatus::Completed if document.is_partial() => "⚠️ ",
            DocumentStatus::Completed => "✅",
            DocumentStatus::Indexing => "🔄",
            DocumentStatus::Pending => "⏳",
            DocumentStatus::Failed => "❌",
        };
        println!(
            "   {} {} ({}) [{}]",
            marker, document.source_name, document.id, document.status
        );
        if document.total_chunks > 0 {
            println!(
                "      {}/{} chunks stored, ~${:.6}",
                document.total_embeddings, document.total_chunks, document.estimated_cost
            );
        }
        if let Some(message) = &document.error_message {
            println!("      Error: {}", message);
        }
    }

    Ok(())
}
