//! Session persistence boundary.
//!
//! The agent core never reads or writes session files itself; it hands its
//! conversation to a `SessionStore` and restores from one.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::message::Conversation;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a conversation under its id, replacing any previous copy.
    async fn save(&self, conversation: &Conversation) -> std::result::Result<(), SessionError>;

    /// Load a previously saved conversation.
    async fn load(&self, session_id: &str) -> std::result::Result<Conversation, SessionError>;
}
