//! Generative-call collaborator

use crate::cancel::CancellationToken;
use crate::error::ChatError;
use quill_types::{AgentId, ConversationId};

/// One prompt sent to the generative backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// Conversation the exchange belongs to
    pub conversation_id: ConversationId,
    /// Persona agent speaking
    pub agent_id: AgentId,
    /// Backend identifier
    pub provider_id: String,
    /// Model override
    pub model_id: Option<String>,
    /// Full prompt text
    pub prompt: String,
}

/// Backend reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Plain reply text
    pub text: String,
    /// Backend message id for correlation
    pub message_id: Option<String>,
}

/// Opaque generative backend
///
/// Implementations should return [`ChatError::Cancelled`] promptly once the
/// token is cancelled.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a prompt and wait for the reply
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ChatError>;
}
