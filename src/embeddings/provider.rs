use serde::{Deserialize, Serialize};

/// Static description of an embedding model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub model: &'static str,
    pub dimensions: usize,
    pub max_tokens: usize,
    pub cost_per_1k_tokens: f64,
}

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EmbeddingProvider {
    #[default]
    #[serde(rename = "text-embedding-004")]
    GeminiTextEmbedding004,
    #[serde(rename = "gemini-embedding-001")]
    GeminiEmbedding001,
}

impl EmbeddingProvider {
    pub const ALL: [Self; 2] = [Self::GeminiTextEmbedding004, Self::GeminiEmbedding001];

    #[inline]
    pub const fn spec(self) -> ProviderSpec {
        match self {
            Self::GeminiTextEmbedding004 => ProviderSpec {
                name: "Google Gemini",
                model: "text-embedding-004",
                dimensions: 768,
                max_tokens: 2048,
                cost_per_1k_tokens: 0.000_01,
            },
            Self::GeminiEmbedding001 => ProviderSpec {
                name: "Google Gemini",
                model: "gemini-embedding-001",
                dimensions: 3072,
                max_tokens: 2048,
                cost_per_1k_tokens: 0.000_15,
            },
        }
    }

    #[inline]
    pub const fn dimensions(self) -> usize {
        self.spec().dimensions
    }

    #[inline]
    pub const fn model(self) -> &'static str {
        self.spec().model
    }
}

impl std::fmt::Display for EmbeddingProvider {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let spec = self.spec();
        write!(f, "{} ({})", spec.name, spec.model)
    }
}
