//! Collaborator traits consumed by the access service

use super::conversation::Conversation;
use super::error::StoreError;
use super::join_link::JoinToken;
use super::types::{ConversationId, UserId};
use async_trait::async_trait;

/// Persistence for conversation aggregates
///
/// Implementations must treat `save` as compare-and-swap on
/// [`Conversation::version`]: the write only lands when the stored version
/// equals `expected_version`, and the stored version is then incremented.
/// The join link token index must be updated in the same write.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation by id
    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Persist a new conversation; fails if the id already exists
    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Persist an updated conversation; returns the new version
    async fn save(
        &self,
        conversation: &Conversation,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Resolve the conversation whose live join link carries `token`
    async fn find_by_token(&self, token: &JoinToken) -> Result<Option<ConversationId>, StoreError>;
}

/// Identity-existence check
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether `user_id` refers to a real user
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError>;
}
