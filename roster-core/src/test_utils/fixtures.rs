//! Test fixtures for creating common test objects

use crate::config::AccessConfig;
use crate::core_access::conversation::{
    AddPolicy, Conversation, ConversationSettings, ConversationType,
};
use crate::core_access::participant::ParticipantRole;
use crate::core_access::service::{ConversationAccessService, NewConversation};
use crate::core_access::storage::MemoryConversationStore;
use crate::core_access::types::{ConversationId, UserId};
use std::sync::Arc;

/// Users registered by [`test_service`]
pub const TEST_USERS: [&str; 7] = ["alice", "bob", "carol", "dave", "eve", "mo", "zed"];

pub fn user(name: &str) -> UserId {
    UserId::from(name)
}

/// Service over a fresh memory store with [`TEST_USERS`] registered
pub fn test_service() -> Arc<ConversationAccessService> {
    test_service_with(AccessConfig::default())
}

pub fn test_service_with(config: AccessConfig) -> Arc<ConversationAccessService> {
    let store = Arc::new(MemoryConversationStore::with_users(TEST_USERS));
    Arc::new(ConversationAccessService::new(store.clone(), store, config))
}

/// Builder for group conversations with preset roles
pub struct TestGroupBuilder {
    name: String,
    admin: UserId,
    policy: AddPolicy,
    members: Vec<UserId>,
    moderators: Vec<UserId>,
    admins: Vec<UserId>,
}

impl TestGroupBuilder {
    pub fn new(admin: &str) -> Self {
        Self {
            name: "Team".to_string(),
            admin: user(admin),
            policy: AddPolicy::AdminsOnly,
            members: Vec::new(),
            moderators: Vec::new(),
            admins: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: AddPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_member(mut self, name: &str) -> Self {
        self.members.push(user(name));
        self
    }

    pub fn with_moderator(mut self, name: &str) -> Self {
        self.moderators.push(user(name));
        self
    }

    /// Extra admin; only [`TestGroupBuilder::build`] can seed these
    pub fn with_admin(mut self, name: &str) -> Self {
        self.admins.push(user(name));
        self
    }

    /// Aggregate only, not persisted
    pub fn build(self) -> Conversation {
        let mut members = self.members;
        members.extend(self.moderators.iter().cloned());
        members.extend(self.admins.iter().cloned());

        let mut conversation = Conversation::create(
            ConversationType::Group,
            Some(self.name),
            self.admin,
            members,
            ConversationSettings {
                who_can_add_participants: self.policy,
            },
        )
        .unwrap();
        for moderator in &self.moderators {
            conversation
                .participants
                .set_role(moderator, ParticipantRole::Moderator)
                .unwrap();
        }
        for admin in &self.admins {
            conversation
                .participants
                .set_role(admin, ParticipantRole::Admin)
                .unwrap();
        }
        conversation
    }

    /// Create through the service and return the id
    pub async fn create_in(self, service: &ConversationAccessService) -> ConversationId {
        assert!(
            self.admins.is_empty(),
            "admin is not assignable through the service"
        );
        let mut members = self.members;
        members.extend(self.moderators.iter().cloned());

        let request = NewConversation::group(self.name, self.admin.clone())
            .with_members(members)
            .with_settings(ConversationSettings {
                who_can_add_participants: self.policy,
            });
        let id = service.create_conversation(request).await.unwrap().id;

        for moderator in &self.moderators {
            service
                .update_participant_role(&id, moderator, ParticipantRole::Moderator, &self.admin)
                .await
                .unwrap();
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_builder_roles() {
        let conv = TestGroupBuilder::new("alice")
            .with_member("bob")
            .with_moderator("mo")
            .with_admin("dave")
            .build();
        assert_eq!(conv.participant(&user("mo")).unwrap().role, ParticipantRole::Moderator);
        assert_eq!(conv.participants.active_admin_count(), 2);
        assert_eq!(conv.participants.active_count(), 4);
    }

    #[tokio::test]
    async fn test_group_builder_through_service() {
        let service = test_service();
        let id = TestGroupBuilder::new("alice")
            .with_moderator("mo")
            .create_in(&service)
            .await;
        let conv = service.get_conversation(&id).await.unwrap();
        assert_eq!(conv.participant(&user("mo")).unwrap().role, ParticipantRole::Moderator);
    }
}
