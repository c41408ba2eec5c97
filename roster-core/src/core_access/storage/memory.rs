//! In-memory conversation store

use super::super::conversation::Conversation;
use super::super::error::StoreError;
use super::super::join_link::JoinToken;
use super::super::manager::{ConversationStore, IdentityDirectory};
use super::super::types::{ConversationId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<ConversationId, Conversation>,
    /// token index key -> conversation
    tokens: HashMap<String, ConversationId>,
    users: HashSet<UserId>,
}

impl MemoryState {
    fn reindex(&mut self, conversation: &Conversation) -> Result<(), StoreError> {
        let new_key = conversation.join_link().map(|l| l.token.index_key());

        if let Some(key) = &new_key {
            match self.tokens.get(key) {
                Some(owner) if owner != &conversation.id => return Err(StoreError::DuplicateToken),
                _ => {}
            }
        }

        self.tokens.retain(|_, owner| owner != &conversation.id);
        if let Some(key) = new_key {
            self.tokens.insert(key, conversation.id.clone());
        }
        Ok(())
    }
}

/// Process-local store, used by tests and embedded deployments
#[derive(Default)]
pub struct MemoryConversationStore {
    state: RwLock<MemoryState>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with known users
    pub fn with_users<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        let state = MemoryState {
            users: users.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn register_user(&self, user_id: UserId) {
        self.state.write().await.users.insert(user_id);
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().await.conversations.get(id).cloned())
    }

    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(StoreError::DuplicateConversation(conversation.id.clone()));
        }
        state.reindex(conversation)?;
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn save(
        &self,
        conversation: &Conversation,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;

        let found = state
            .conversations
            .get(&conversation.id)
            .map(|c| c.version)
            .ok_or_else(|| StoreError::MissingConversation(conversation.id.clone()))?;
        if found != expected_version {
            return Err(StoreError::StaleVersion {
                id: conversation.id.clone(),
                expected: expected_version,
                found,
            });
        }

        state.reindex(conversation)?;

        let mut stored = conversation.clone();
        stored.version = expected_version + 1;
        let version = stored.version;
        state.conversations.insert(stored.id.clone(), stored);
        Ok(version)
    }

    async fn find_by_token(&self, token: &JoinToken) -> Result<Option<ConversationId>, StoreError> {
        Ok(self.state.read().await.tokens.get(&token.index_key()).cloned())
    }
}

#[async_trait]
impl IdentityDirectory for MemoryConversationStore {
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        Ok(self.state.read().await.users.contains(user_id))
    }
}
