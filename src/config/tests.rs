use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.embedding.batch_size = 32;
        original_config.rag.similarity_threshold = 0.55;
        original_config.generation.model = "gemini-1.5-pro".to_string();

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn api_key_absent_from_default_toml() {
        let toml_content =
            toml::to_string_pretty(&Config::default()).expect("should serialize defaults");
        assert!(!toml_content.contains("api_key"));
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [rag
            max_matches = "many"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_with_defaults() {
        let partial_toml = r#"
            [rag]
            similarity_threshold = 0.5
        "#;

        let config: Config = toml::from_str(partial_toml).expect("missing fields use defaults");
        assert!((config.rag.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.rag.max_matches, 5);
        assert_eq!(config.embedding.batch_size, 100);
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [embedding]
            base_url = "http://localhost:8080"
            batch_size = 20
            batch_delay_ms = 250
            request_timeout_secs = 10
            retry_attempts = 3

            [rag]
            enabled = true
            embedding_provider = "gemini-embedding-001"
            similarity_threshold = 0.8
            max_matches = 3
            include_metadata = false
            insert_batch_size = 25

            [rag.chunking]
            chunk_size = 500
            chunk_overlap = 50
            min_chunk_size = 50

            [generation]
            model = "gemini-1.5-pro"
            temperature = 0.2
            max_output_tokens = 1024
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        config.validate().expect("should be valid");
        assert_eq!(config.embedding.batch_size, 20);
        assert_eq!(
            config.rag.embedding_provider,
            crate::embeddings::EmbeddingProvider::GeminiEmbedding001
        );
        assert_eq!(config.rag.chunking.chunk_size, 500);
        assert!(!config.rag.include_metadata);
        assert_eq!(config.generation.max_output_tokens, 1024);
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidUrl("ftp://example.com".to_string()),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidThreshold(1.5),
            ConfigError::InvalidOverlap(300, 200),
            ConfigError::InvalidModel(String::new()),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(!message.is_empty());
            assert!(message.len() > 10);
        }
    }

    #[test]
    #[serial_test::serial]
    fn get_config_dir_honors_override() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        // SAFETY: env-mutating tests are serialized
        unsafe { std::env::set_var(HOME_ENV, temp_dir.path()) };
        let dir = get_config_dir().expect("should resolve config dir");
        // SAFETY: env-mutating tests are serialized
        unsafe { std::env::remove_var(HOME_ENV) };

        assert_eq!(dir, temp_dir.path());
    }
}
