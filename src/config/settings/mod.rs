
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embeddings::{BatchSettings, ChunkingConfig, EmbeddingProvider};
use crate::http::DEFAULT_API_BASE;

/// Environment variable that overrides the configured API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Environment variable that overrides the application directory
pub const HOME_ENV: &str = "GEM_RAG_HOME";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the embedding API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_BASE.to_string(),
            batch_size: 100,
            batch_delay_ms: 100,
            request_timeout_secs: 30,
            retry_attempts: 2,
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    pub embedding_provider: EmbeddingProvider,
    pub similarity_threshold: f32,
    pub max_matches: usize,
    pub include_metadata: bool,
    pub insert_batch_size: usize,
    pub chunking: ChunkingConfig,
}

impl Default for RagConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_provider: EmbeddingProvider::default(),
            similarity_threshold: 0.7,
            max_matches: 5,
            include_metadata: true,
            insert_batch_size: 50,
            chunking: ChunkingConfig::default(),
        }
    }
}

/// Chat model settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid request timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid similarity threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidThreshold(f32),
    #[error("Invalid max matches: {0} (must be between 1 and 100)")]
    InvalidMaxMatches(usize),
    #[error("Invalid insert batch size: {0} (must be between 1 and 1000)")]
    InvalidInsertBatchSize(usize),
    #[error("Invalid chunk size: {0} (must be between 100 and 8000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    InvalidOverlap(usize, usize),
    #[error("Min chunk size ({0}) must be between 1 and chunk size ({1})")]
    InvalidMinChunkSize(usize, usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max output tokens: {0} (must be between 1 and 8192)")]
    InvalidMaxOutputTokens(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Application directory: `$GEM_RAG_HOME` when set, otherwise `~/.gem-rag`
    #[inline]
    pub fn app_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".gem-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("gem-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.rag.validate()?;
        self.generation.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Path of the SQLite document registry
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Directory of the LanceDB vector index
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=300).contains(&self.request_timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.request_timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    /// The API key from `GEMINI_API_KEY`, falling back to the config file
    #[inline]
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[inline]
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            request_timeout: Some(self.request_timeout()),
        }
    }

    #[inline]
    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_request_timeout_secs(&mut self, seconds: u64) -> Result<(), ConfigError> {
        if !(1..=300).contains(&seconds) {
            return Err(ConfigError::InvalidTimeout(seconds));
        }
        self.request_timeout_secs = seconds;
        Ok(())
    }

    #[inline]
    pub fn set_retry_attempts(&mut self, attempts: u32) -> Result<(), ConfigError> {
        if !(1..=10).contains(&attempts) {
            return Err(ConfigError::InvalidRetryAttempts(attempts));
        }
        self.retry_attempts = attempts;
        Ok(())
    }
}

impl RagConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }

        if !(1..=100).contains(&self.max_matches) {
            return Err(ConfigError::InvalidMaxMatches(self.max_matches));
        }

        if self.insert_batch_size == 0 || self.insert_batch_size > 1000 {
            return Err(ConfigError::InvalidInsertBatchSize(self.insert_batch_size));
        }

        self.validate_chunking_config()
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8000).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::InvalidOverlap(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        if config.min_chunk_size == 0 || config.min_chunk_size > config.chunk_size {
            return Err(ConfigError::InvalidMinChunkSize(
                config.min_chunk_size,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn set_similarity_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        self.similarity_threshold = threshold;
        Ok(())
    }

    #[inline]
    pub fn set_max_matches(&mut self, max_matches: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&max_matches) {
            return Err(ConfigError::InvalidMaxMatches(max_matches));
        }
        self.max_matches = max_matches;
        Ok(())
    }

    #[inline]
    pub fn set_chunking(&mut self, chunking: ChunkingConfig) -> Result<(), ConfigError> {
        let temp_config = RagConfig {
            chunking: chunking.clone(),
            ..self.clone()
        };
        temp_config.validate_chunking_config()?;
        self.chunking = chunking;
        Ok(())
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=8192).contains(&self.max_output_tokens) {
            return Err(ConfigError::InvalidMaxOutputTokens(self.max_output_tokens));
        }

        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}
