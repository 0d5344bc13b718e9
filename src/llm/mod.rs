pub mod deepseek;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::chat::ChatMessage;

/// Boundary to the credentialed chat-completion API. The server handler only
/// sees this trait, so tests substitute a scripted implementation.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Forward an already-assembled conversation (persona prompt first) and
    /// return the first completion's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;

    fn model(&self) -> &str;
}
