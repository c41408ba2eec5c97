/*
    access_scenarios.rs - End-to-end membership and join link scenarios

    Drives the access service over the in-memory store the way a messaging
    backend would: create, add, invite, remove, re-role, link and join.
*/

mod common;

use common::{expect_kind, memory_service, team, user, USERS};
use roster_core::config::AccessConfig;
use roster_core::core_access::{
    Action, ActionKind, AddPolicy, ConversationAccessService, ConversationStore, ErrorKind,
    MemoryConversationStore, NewConversation, Participant, ParticipantRole, ParticipantStatus,
};
use std::sync::Arc;

#[tokio::test]
async fn test_moderator_add_under_admins_only_is_unauthorized() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;

    expect_kind(
        service
            .add_participant(&id, &user("carol"), &user("mo"), ParticipantRole::Member)
            .await,
        ErrorKind::Authorization,
    );
}

#[tokio::test]
async fn test_moderator_add_under_moderators_and_admins() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::ModeratorsAndAdmins).await;

    service
        .add_participant(&id, &user("carol"), &user("mo"), ParticipantRole::Member)
        .await
        .unwrap();
    // Moderators cannot hand out admin, and members still cannot add
    expect_kind(
        service
            .add_participant(&id, &user("dave"), &user("mo"), ParticipantRole::Admin)
            .await,
        ErrorKind::Authorization,
    );
    expect_kind(
        service
            .add_participant(&id, &user("dave"), &user("bob"), ParticipantRole::Member)
            .await,
        ErrorKind::Authorization,
    );
}

#[tokio::test]
async fn test_admin_promotion_to_admin_is_unauthorized_for_any_target() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;

    for target in ["bob", "mo", "zed"] {
        expect_kind(
            service
                .update_participant_role(&id, &user(target), ParticipantRole::Admin, &user("alice"))
                .await,
            ErrorKind::Authorization,
        );
    }
}

#[tokio::test]
async fn test_two_admin_group_remove_then_self_removal() {
    let store = Arc::new(MemoryConversationStore::with_users(USERS));
    let service =
        ConversationAccessService::new(store.clone(), store.clone(), AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;

    // A second admin can only come from persisted state
    let mut conv = store.load(&id).await.unwrap().unwrap();
    let version = conv.version;
    conv.participants
        .push(Participant::active(user("dave"), ParticipantRole::Admin, None))
        .unwrap();
    store.save(&conv, version).await.unwrap();

    service
        .remove_participant(&id, &user("dave"), &user("alice"))
        .await
        .unwrap();
    expect_kind(
        service
            .remove_participant(&id, &user("alice"), &user("alice"))
            .await,
        ErrorKind::Authorization,
    );

    let conv = service.get_conversation(&id).await.unwrap();
    assert_eq!(conv.participants.active_admin_count(), 1);
    assert!(conv.participants.is_active(&user("alice")));
}

#[tokio::test]
async fn test_join_increments_usage_and_membership_by_one() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;
    let link = service
        .generate_join_link(&id, &user("alice"), Some(7), None)
        .await
        .unwrap();

    let before = service.get_conversation(&id).await.unwrap();
    service.join_by_token(&link.token, &user("carol")).await.unwrap();
    let after = service.get_conversation(&id).await.unwrap();

    assert_eq!(
        after.join_link().unwrap().usage_count,
        before.join_link().unwrap().usage_count + 1
    );
    assert_eq!(
        after.participants.active_count(),
        before.participants.active_count() + 1
    );
    let carol = after.participant(&user("carol")).unwrap();
    assert_eq!(carol.role, ParticipantRole::Member);
    assert_eq!(carol.status, ParticipantStatus::Active);
}

#[tokio::test]
async fn test_active_user_rejoining_counts_usage_only() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;
    let link = service
        .generate_join_link(&id, &user("alice"), None, None)
        .await
        .unwrap();

    let before = service.get_conversation(&id).await.unwrap();
    service.join_by_token(&link.token, &user("bob")).await.unwrap();
    service.join_by_token(&link.token, &user("bob")).await.unwrap();
    let after = service.get_conversation(&id).await.unwrap();

    assert_eq!(after.join_link().unwrap().usage_count, 2);
    assert_eq!(
        after.participants.active_count(),
        before.participants.active_count()
    );
}

#[tokio::test]
async fn test_single_use_link() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;
    let link = service
        .generate_join_link(&id, &user("alice"), None, Some(1))
        .await
        .unwrap();

    service.join_by_token(&link.token, &user("carol")).await.unwrap();
    expect_kind(
        service.join_by_token(&link.token, &user("dave")).await,
        ErrorKind::Conflict,
    );
}

#[tokio::test]
async fn test_zero_day_link_never_works() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;
    let link = service
        .generate_join_link(&id, &user("alice"), Some(0), None)
        .await
        .unwrap();

    expect_kind(
        service.join_by_token(&link.token, &user("carol")).await,
        ErrorKind::Conflict,
    );
    let conv = service.get_conversation(&id).await.unwrap();
    assert_eq!(conv.join_link().unwrap().usage_count, 0);
}

#[tokio::test]
async fn test_concurrent_joins_on_single_use_link() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AdminsOnly).await;
    let link = service
        .generate_join_link(&id, &user("alice"), None, Some(1))
        .await
        .unwrap();

    let a = {
        let service = service.clone();
        let token = link.token.clone();
        tokio::spawn(async move { service.join_by_token(&token, &user("carol")).await })
    };
    let b = {
        let service = service.clone();
        let token = link.token.clone();
        tokio::spawn(async move { service.join_by_token(&token, &user("dave")).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(result.kind(), ErrorKind::Conflict);
    }

    let conv = service.get_conversation(&id).await.unwrap();
    assert_eq!(conv.join_link().unwrap().usage_count, 1);
    let joined = ["carol", "dave"]
        .iter()
        .filter(|name| conv.participants.is_active(&user(name)))
        .count();
    assert_eq!(joined, 1);
}

#[tokio::test]
async fn test_group_never_loses_its_last_admin() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AllMembers).await;

    // Every user tries to remove or demote alice
    for actor in ["alice", "mo", "bob", "carol"] {
        let _ = service
            .remove_participant(&id, &user("alice"), &user(actor))
            .await;
        let _ = service
            .update_participant_role(&id, &user("alice"), ParticipantRole::Member, &user(actor))
            .await;
    }

    let conv = service.get_conversation(&id).await.unwrap();
    assert_eq!(conv.participants.active_admin_count(), 1);
    conv.check_invariants().unwrap();
}

#[tokio::test]
async fn test_capability_queries() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::ModeratorsAndAdmins).await;

    let ask = |name: &'static str, action: Action| {
        let service = service.clone();
        let id = id.clone();
        async move { service.evaluate(&id, &user(name), &action).await.unwrap() }
    };

    assert!(ask("alice", Action::GenerateJoinLink).await);
    assert!(!ask("mo", Action::GenerateJoinLink).await);
    assert!(
        ask(
            "mo",
            Action::from_parts(ActionKind::AddParticipant, None, None).unwrap()
        )
        .await
    );
    assert!(
        ask(
            "mo",
            Action::from_parts(ActionKind::RemoveParticipant, Some(user("bob")), None).unwrap()
        )
        .await
    );
    assert!(
        !ask(
            "mo",
            Action::from_parts(ActionKind::RemoveParticipant, Some(user("alice")), None).unwrap()
        )
        .await
    );
    assert!(!ask("zed", Action::GenerateJoinLink).await);
}

#[tokio::test]
async fn test_removed_participant_loses_capabilities_and_can_rejoin() {
    let service = memory_service(AccessConfig::default());
    let id = team(&service, AddPolicy::AllMembers).await;

    service
        .remove_participant(&id, &user("bob"), &user("mo"))
        .await
        .unwrap();
    expect_kind(
        service
            .add_participant(&id, &user("carol"), &user("bob"), ParticipantRole::Member)
            .await,
        ErrorKind::Authorization,
    );

    let link = service
        .generate_join_link(&id, &user("alice"), None, None)
        .await
        .unwrap();
    let outcome = service.join_by_token(&link.token, &user("bob")).await.unwrap();
    assert!(outcome.newly_joined);

    let conv = service.get_conversation(&id).await.unwrap();
    let history: Vec<_> = conv
        .participants
        .records()
        .iter()
        .filter(|p| p.user_id == user("bob"))
        .map(|p| p.status)
        .collect();
    assert_eq!(history, vec![ParticipantStatus::Removed, ParticipantStatus::Active]);
}

#[tokio::test]
async fn test_direct_conversation_lifecycle() {
    let service = memory_service(AccessConfig::default());
    let conv = service
        .create_conversation(NewConversation::direct(user("alice"), user("bob")))
        .await
        .unwrap();

    expect_kind(
        service
            .remove_participant(&conv.id, &user("bob"), &user("alice"))
            .await,
        ErrorKind::Authorization,
    );
    expect_kind(
        service
            .create_conversation(NewConversation::direct(user("alice"), user("alice")))
            .await,
        ErrorKind::Validation,
    );
    assert!(!service
        .evaluate(&conv.id, &user("alice"), &Action::GenerateJoinLink)
        .await
        .unwrap());
}
