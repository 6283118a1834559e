// Generation boundary
// Grounds a chat turn with retrieved context when any is available

pub mod gemini;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Result;
use crate::rag::RagService;

pub use gemini::GeminiChatClient;

const CONTEXT_START: &str = "=== RETRIEVED CONTEXT START ===";
const CONTEXT_END: &str = "=== RETRIEVED CONTEXT END ===";

/// A single-turn chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub message: String,
}

/// Capability interface over a chat-completion API
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: &ChatRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    pub text: String,
    /// True when retrieved context was added to the system prompt
    pub grounded: bool,
    pub sources: Vec<String>,
}

/// Append a delimited context section to a system prompt
#[inline]
pub fn build_augmented_prompt(system_prompt: &str, context: &str) -> String {
    let mut prompt = system_prompt.trim_end().to_string();
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Answer using the context below. Prioritize it over general knowledge. \
         If the context does not support an answer, say so plainly.\n\n",
    );
    prompt.push_str(CONTEXT_START);
    prompt.push('\n');
    prompt.push_str(context);
    prompt.push('\n');
    prompt.push_str(CONTEXT_END);
    prompt
}

/// Chat orchestration with optional retrieval.
///
/// `rag` is `None` when no embedding provider is configured.
#[derive(Clone)]
pub struct GenerationService {
    chat: Arc<dyn ChatModel>,
    rag: Option<RagService>,
}

impl GenerationService {
    #[inline]
    pub fn new(chat: Arc<dyn ChatModel>, rag: Option<RagService>) -> Self {
        Self { chat, rag }
    }

    /// Answer one message. Retrieval problems are logged and never fail
    /// the turn; only the chat call itself can.
    #[inline]
    pub async fn respond(
        &self,
        collection_id: &str,
        system_prompt: &str,
        message: &str,
    ) -> Result<GeneratedReply> {
        let (system_prompt, sources) = match self.retrieve(collection_id, message).await {
            Some((context, sources)) => (build_augmented_prompt(system_prompt, &context), sources),
            None => (system_prompt.to_string(), Vec::new()),
        };
        let grounded = !sources.is_empty();

        let request = ChatRequest {
            system_prompt,
            message: message.to_string(),
        };
        let text = self.chat.generate(&request).await?;

        info!(
            "Generated reply for {} ({} grounded sources)",
            collection_id,
            sources.len()
        );
        Ok(GeneratedReply {
            text,
            grounded,
            sources,
        })
    }

    async fn retrieve(&self, collection_id: &str, message: &str) -> Option<(String, Vec<String>)> {
        let rag = self.rag.as_ref()?;
        if !rag.config().enabled {
            debug!("Retrieval disabled; generating without context");
            return None;
        }
        if !rag.has_embeddings(collection_id).await {
            debug!("{} has no embeddings; generating without context", collection_id);
            return None;
        }

        match rag.search_for_ai(collection_id, message).await {
            Ok(ai_context) if !ai_context.context.is_empty() => {
                Some((ai_context.context, ai_context.sources))
            }
            Ok(_) => {
                debug!("No context above threshold for {}", collection_id);
                None
            }
            Err(e) => {
                warn!(
                    "Retrieval failed for {}, generating without context: {}",
                    collection_id, e
                );
                None
            }
        }
    }
}
