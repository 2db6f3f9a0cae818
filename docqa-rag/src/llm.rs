//! Language model trait used to condense questions and generate answers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::ConversationTurn;

/// A single generation call: instructions, prior turns, and the new message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// System instructions, including any grounding context.
    pub system: String,
    /// Prior turns, oldest first, replayed as user/assistant messages.
    pub history: Vec<ConversationTurn>,
    /// The user message to answer.
    pub prompt: String,
}

/// A chat-completion service with a text-in / text-out contract.
///
/// Implementations report unreachable backends as
/// [`RagError::ServiceUnavailable`](crate::RagError::ServiceUnavailable) and
/// throttling as [`RagError::RateLimited`](crate::RagError::RateLimited).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name used in logs and error messages.
    fn name(&self) -> &str;

    /// Produce the assistant reply for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
