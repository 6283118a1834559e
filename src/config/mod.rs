// Configuration management module
// TOML settings under the application directory plus interactive setup

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV, Config, ConfigError, EmbeddingConfig, GenerationConfig, HOME_ENV, RagConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::app_dir()
}
