//! Collaborator traits for identity, membership and chat persistence

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::{ChatMessage, MessageRoute, Reaction, ReactionChange};
use crate::error::DomainError;
use crate::value_objects::UserId;

/// Result type for collaborator operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Identity
// ============================================================================

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Map the identity presented at connect time to a known user
    async fn resolve(&self, raw: &str) -> RepoResult<Option<UserId>>;
}

// ============================================================================
// Membership
// ============================================================================

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Group chats the user currently belongs to
    async fn groups_for_user(&self, user_id: &UserId) -> RepoResult<Vec<String>>;

    /// Every participant of a chat, online or not
    async fn chat_participants(&self, chat_id: &str) -> RepoResult<Vec<UserId>>;

    /// Liveness probe used by readiness checks
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}

// ============================================================================
// Chat persistence
// ============================================================================

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Store a message, returning the stored representation
    async fn save_message(&self, message: &ChatMessage) -> RepoResult<Value>;

    /// Addressing data of a stored message
    async fn message_route(&self, message_id: &str) -> RepoResult<Option<MessageRoute>>;

    /// Add, replace or remove the user's reaction on a message
    async fn toggle_reaction(&self, reaction: &Reaction) -> RepoResult<ReactionChange>;

    /// Apply per-participant conversation settings
    async fn update_conversation(
        &self,
        chat_id: &str,
        user_id: &UserId,
        updates: &Value,
    ) -> RepoResult<()>;
}
