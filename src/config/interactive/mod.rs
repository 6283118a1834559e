
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

use super::{API_KEY_ENV, Config, ConfigError, EmbeddingConfig, GenerationConfig, RagConfig};
use crate::embeddings::{EmbeddingProvider, GeminiEmbedder};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 gem-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Gemini API").bold().yellow());
    eprintln!("Embeddings and chat completions are served by the Gemini API.");
    eprintln!();
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_rag(&mut config.rag)?;

    eprintln!();
    eprintln!("{}", style("Generation").bold().yellow());
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_embedding_connection(&config) {
        Ok(()) => eprintln!("{}", style("✓ Gemini embedding request succeeded!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not reach the Gemini API").yellow()
            );
            eprintln!("  {}", style(e).dim());
            eprintln!("You can continue, but indexing and search will fail until this works.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Gemini API:").bold().yellow());
    eprintln!(
        "  API key: {}",
        style(describe_api_key(&config.embedding)).cyan()
    );
    match config.embedding.base_url() {
        Ok(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Base URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Batch size: {}",
        style(config.embedding.batch_size).cyan()
    );
    eprintln!(
        "  Batch delay: {}",
        style(format!("{} ms", config.embedding.batch_delay_ms)).cyan()
    );
    eprintln!(
        "  Request timeout: {}",
        style(format!("{} s", config.embedding.request_timeout_secs)).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Enabled: {}", style(config.rag.enabled).cyan());
    eprintln!(
        "  Provider: {}",
        style(config.rag.embedding_provider).cyan()
    );
    eprintln!(
        "  Similarity threshold: {}",
        style(config.rag.similarity_threshold).cyan()
    );
    eprintln!("  Max matches: {}", style(config.rag.max_matches).cyan());
    eprintln!(
        "  Chunk size / overlap: {}",
        style(format!(
            "{} / {}",
            config.rag.chunking.chunk_size, config.rag.chunking.chunk_overlap
        ))
        .cyan()
    );

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    eprintln!(
        "  Temperature: {}",
        style(config.generation.temperature).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn describe_api_key(embedding: &EmbeddingConfig) -> String {
    let from_env = std::env::var(API_KEY_ENV).is_ok_and(|key| !key.trim().is_empty());
    match (from_env, embedding.resolve_api_key()) {
        (true, _) => format!("set via {}", API_KEY_ENV),
        (false, Some(_)) => "set in config file".to_string(),
        (false, None) => "not configured".to_string(),
    }
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    if config_dir.join("config.toml").exists() {
        let config = Config::load(config_dir)?;
        eprintln!("{}", style("Found existing configuration.").green());
        Ok(config)
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        Config::load(config_dir)
    }
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let keep_existing = embedding.api_key.is_some()
        && Confirm::new()
            .with_prompt("Keep the stored API key?")
            .default(true)
            .interact()?;

    if !keep_existing {
        let api_key: String = Password::new()
            .with_prompt(format!(
                "Gemini API key (leave empty to rely on {})",
                API_KEY_ENV
            ))
            .allow_empty_password(true)
            .interact()?;
        embedding.set_api_key(Some(api_key));
    }

    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(embedding.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = EmbeddingConfig {
                base_url: input.clone(),
                ..EmbeddingConfig::default()
            };
            candidate.base_url().map(|_| ())
        })
        .interact_text()?;

    let batch_size: usize = Input::new()
        .with_prompt("Chunks per embedding batch")
        .default(embedding.batch_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.set_base_url(base_url)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_rag(rag: &mut RagConfig) -> Result<()> {
    let providers: Vec<String> = EmbeddingProvider::ALL
        .iter()
        .map(|provider| {
            format!(
                "{} ({} dimensions)",
                provider.model(),
                provider.dimensions()
            )
        })
        .collect();
    let default_index = EmbeddingProvider::ALL
        .iter()
        .position(|&p| p == rag.embedding_provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Embedding model")
        .default(default_index)
        .items(&providers)
        .interact()?;
    let provider = EmbeddingProvider::ALL
        .get(provider_index)
        .copied()
        .unwrap_or_default();

    if provider != rag.embedding_provider {
        eprintln!(
            "{}",
            style("Changing the embedding model requires re-indexing every collection.").yellow()
        );
    }

    let threshold: f32 = Input::new()
        .with_prompt("Similarity threshold (0.0 - 1.0)")
        .default(rag.similarity_threshold)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Threshold must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;

    let max_matches: usize = Input::new()
        .with_prompt("Maximum matches per query")
        .default(rag.max_matches)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Max matches must be between 1 and 100")
            }
        })
        .interact_text()?;

    rag.embedding_provider = provider;
    rag.set_similarity_threshold(threshold)?;
    rag.set_max_matches(max_matches)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Chat model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    generation.set_model(model)?;
    Ok(())
}

fn test_embedding_connection(config: &Config) -> Result<()> {
    let embedder = GeminiEmbedder::new(&config.embedding, config.rag.embedding_provider)?;
    embedder.health_check()?;
    Ok(())
}
