//! Shared helpers for integration tests

#![allow(dead_code)]

use roster_core::config::AccessConfig;
use roster_core::core_access::{
    AccessError, AddPolicy, ConversationAccessService, ConversationId, ConversationSettings,
    ErrorKind, MemoryConversationStore, NewConversation, ParticipantRole, SqlConversationStore,
    UserId,
};
use std::path::Path;
use std::sync::Arc;

pub const USERS: [&str; 8] = ["alice", "bob", "carol", "dave", "eve", "mo", "zed", "yan"];

pub fn user(name: &str) -> UserId {
    UserId::from(name)
}

pub fn memory_service(config: AccessConfig) -> Arc<ConversationAccessService> {
    let store = Arc::new(MemoryConversationStore::with_users(USERS));
    Arc::new(ConversationAccessService::new(store.clone(), store, config))
}

pub fn sql_service(path: &Path, config: AccessConfig) -> Arc<ConversationAccessService> {
    let store = Arc::new(SqlConversationStore::open(path, 4).unwrap());
    for name in USERS {
        store.register_user(&user(name)).unwrap();
    }
    Arc::new(ConversationAccessService::new(store.clone(), store, config))
}

/// Group "Team": alice=admin, mo=moderator, bob=member
pub async fn team(service: &ConversationAccessService, policy: AddPolicy) -> ConversationId {
    let id = service
        .create_conversation(
            NewConversation::group("Team", user("alice"))
                .with_members(vec![user("bob"), user("mo")])
                .with_settings(ConversationSettings {
                    who_can_add_participants: policy,
                }),
        )
        .await
        .unwrap()
        .id;
    service
        .update_participant_role(&id, &user("mo"), ParticipantRole::Moderator, &user("alice"))
        .await
        .unwrap();
    id
}

pub fn expect_kind<T: std::fmt::Debug>(
    result: Result<T, AccessError>,
    kind: ErrorKind,
) -> AccessError {
    match result {
        Ok(v) => panic!("expected {} error, got Ok({:?})", kind, v),
        Err(e) => {
            assert_eq!(e.kind(), kind, "unexpected error: {}", e);
            e
        }
    }
}
