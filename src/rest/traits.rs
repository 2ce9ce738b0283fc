//! ChatApi trait definition
//!
//! Abstract interface over the chat backend's REST endpoints. The engine
//! only ever talks to this trait, so tests swap in the scripted mock and
//! production wires up the reqwest client.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::{ConversationRecord, Message};

/// Abstract interface over the chat REST collaborator.
///
/// Implementations must be `Send + Sync` for `Arc<dyn ChatApi>` sharing.
/// - [`HttpChatApi`](super::HttpChatApi): reqwest client for the real backend
/// - [`MockChatApi`](super::MockChatApi): scripted in-memory backend for tests
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Persist a message addressed to `receiver_id`. Returns the confirmed
    /// record carrying the server-assigned id and timestamp.
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, ChatError>;

    /// Complete ordered history between this session and `counterpart_id`.
    async fn conversation_history(&self, counterpart_id: &str)
        -> Result<Vec<Message>, ChatError>;

    /// Aggregated inbox, one record per correspondent.
    async fn conversations(&self) -> Result<Vec<ConversationRecord>, ChatError>;
}
