use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gem_rag::commands::{
    ask, delete_collection, delete_document, index_file, preview_file, reindex_file, search,
    show_status,
};
use gem_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use gem_rag::embeddings::FormatHint;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Parser)]
#[command(name = "gem-rag")]
#[command(about = "Index documents and answer questions grounded in them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Gemini API key, retrieval and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and store a document in a collection
    Index {
        /// Collection to add the document to
        collection: String,
        /// Path of the plain-text, CSV or JSON file
        file: PathBuf,
        /// Document ID to use instead of a generated one
        #[arg(long)]
        document_id: Option<String>,
        /// Chunking strategy: text, csv or json. Defaults to the file extension
        #[arg(long)]
        format: Option<FormatHint>,
    },
    /// Replace a document's embeddings with a fresh indexing run
    Reindex {
        collection: String,
        document_id: String,
        file: PathBuf,
        #[arg(long)]
        format: Option<FormatHint>,
    },
    /// Show how a file would be chunked and what it would cost, without calling the API
    Preview {
        file: PathBuf,
        #[arg(long)]
        format: Option<FormatHint>,
    },
    /// Find the chunks most similar to a query
    Search { collection: String, query: String },
    /// Ask a question, grounded in the collection when relevant chunks exist
    Ask {
        collection: String,
        message: String,
        /// System prompt for the chat model
        #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
        system: String,
    },
    /// Delete a document's embeddings
    DeleteDocument { document_id: String },
    /// Delete every embedding in a collection
    DeleteCollection { collection: String },
    /// Show indexing status of a collection
    Status { collection: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir()?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Index {
            collection,
            file,
            document_id,
            format,
        } => {
            index_file(&config, &collection, &file, document_id, format).await?;
        }
        Commands::Reindex {
            collection,
            document_id,
            file,
            format,
        } => {
            reindex_file(&config, &collection, &document_id, &file, format).await?;
        }
        Commands::Preview { file, format } => {
            preview_file(&config, &file, format).await?;
        }
        Commands::Search { collection, query } => {
            search(&config, &collection, &query).await?;
        }
        Commands::Ask {
            collection,
            message,
            system,
        } => {
            ask(&config, &collection, &message, &system).await?;
        }
        Commands::DeleteDocument { document_id } => {
            delete_document(&config, &document_id).await?;
        }
        Commands::DeleteCollection { collection } => {
            delete_collection(&config, &collection).await?;
        }
        Commands::Status { collection } => {
            show_status(&config, &collection).await?;
        }
    }

    Ok(())
}
