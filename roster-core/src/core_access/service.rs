//! Conversation access service
//!
//! Orchestrates the membership state machine on top of a
//! [`ConversationStore`] and an [`IdentityDirectory`]. Every mutation follows
//! the same path:
//!
//! 1. take the per-conversation lock (bounded by `lock_timeout`);
//! 2. load the aggregate and apply the transition, permission check included;
//! 3. verify the aggregate invariants;
//! 4. compare-and-swap save, reloading and re-applying on a stale version.
//!
//! A transition either lands in one save or has no effect at all.

use super::conversation::{Conversation, ConversationSettings, ConversationType};
use super::error::{AccessError, StoreError};
use super::join_link::{JoinLink, JoinToken};
use super::locks::ConversationLocks;
use super::manager::{ConversationStore, IdentityDirectory};
use super::participant::{Participant, ParticipantRole, ParticipantStatus};
use super::permission::{Action, Decision, DenyReason, PermissionEngine, PermissionTable};
use super::registry::RegistryError;
use super::token::TokenGenerator;
use super::types::{ConversationId, Timestamp, UserId};
use crate::config::AccessConfig;
use crate::metrics::{self, Timer};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Parameters for [`ConversationAccessService::create_conversation`]
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationType,
    pub name: Option<String>,
    pub creator: UserId,
    pub members: Vec<UserId>,
    pub settings: ConversationSettings,
}

impl NewConversation {
    /// Group conversation with default settings
    pub fn group(name: impl Into<String>, creator: UserId) -> Self {
        Self {
            kind: ConversationType::Group,
            name: Some(name.into()),
            creator,
            members: Vec::new(),
            settings: ConversationSettings::default(),
        }
    }

    /// One-to-one conversation
    pub fn direct(creator: UserId, other: UserId) -> Self {
        Self {
            kind: ConversationType::Direct,
            name: None,
            creator,
            members: vec![other],
            settings: ConversationSettings::default(),
        }
    }

    pub fn with_members(mut self, members: Vec<UserId>) -> Self {
        self.members = members;
        self
    }

    pub fn with_settings(mut self, settings: ConversationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Result of a successful join through a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOutcome {
    pub conversation_id: ConversationId,
    /// The joiner's membership record after the join
    pub participant: Participant,
    /// Link usage count after this join
    pub usage_count: u32,
    /// False when the joiner was already active
    pub newly_joined: bool,
}

fn registry_violation(id: &ConversationId, err: RegistryError) -> AccessError {
    error!(conversation_id = %id, error = %err, "Participant registry rejected a transition");
    AccessError::InvariantViolation(format!("{}: {}", id, err))
}

/// Access-control front door for conversations
pub struct ConversationAccessService {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn IdentityDirectory>,
    engine: PermissionEngine,
    tokens: TokenGenerator,
    locks: ConversationLocks,
    config: AccessConfig,
}

impl ConversationAccessService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn IdentityDirectory>,
        config: AccessConfig,
    ) -> Self {
        let tokens = TokenGenerator::new(
            config.token_bytes,
            config.token_attempts,
            config.max_link_expiry_days,
        );
        Self {
            store,
            directory,
            engine: PermissionEngine::default(),
            tokens,
            locks: ConversationLocks::new(),
            config,
        }
    }

    /// Replace the permission table
    pub fn with_permission_table(mut self, table: PermissionTable) -> Self {
        self.engine = PermissionEngine::new(table);
        self
    }

    /// Replace the token generator (tests use this to force collisions)
    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    /// Shareable URL for `link` under the configured base URL
    pub fn share_url(&self, link: &JoinLink) -> String {
        link.share_url(&self.config.share_base_url)
    }

    /// Create a conversation
    pub async fn create_conversation(
        &self,
        request: NewConversation,
    ) -> Result<Conversation, AccessError> {
        let _timer = Timer::new("create_conversation");

        self.ensure_user(&request.creator).await?;
        for member in &request.members {
            self.ensure_user(member).await?;
        }

        let conversation = Conversation::create(
            request.kind,
            request.name,
            request.creator,
            request.members,
            request.settings,
        )?;
        self.store.insert(&conversation).await?;

        info!(
            conversation_id = %conversation.id,
            kind = %conversation.kind,
            creator = %conversation.created_by,
            participants = conversation.participants.active_count(),
            "Conversation created"
        );
        Ok(conversation)
    }

    /// Read-only view of a conversation
    pub async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, AccessError> {
        self.load_required(conversation_id).await
    }

    /// Add `target` as an active participant with `role`
    ///
    /// A pending invitation for `target` is activated in place.
    pub async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        target: &UserId,
        acting_user: &UserId,
        role: ParticipantRole,
    ) -> Result<Participant, AccessError> {
        let _timer = Timer::new("add_participant");
        self.ensure_user(target).await?;

        let action = Action::AddParticipant { role };
        let participant = self
            .mutate(conversation_id, "add_participant", |conversation| {
                self.authorize(conversation, acting_user, &action)?;

                let registry = &mut conversation.participants;
                match registry.live(target).map(|p| p.status) {
                    Some(ParticipantStatus::Active) => {
                        Err(AccessError::AlreadyParticipant(target.clone()))
                    }
                    Some(_) => registry
                        .activate(target, Some(role))
                        .map(Participant::clone)
                        .map_err(|e| registry_violation(conversation_id, e)),
                    None => {
                        let record =
                            Participant::active(target.clone(), role, Some(acting_user.clone()));
                        registry
                            .push(record.clone())
                            .map_err(|e| registry_violation(conversation_id, e))?;
                        Ok(record)
                    }
                }
            })
            .await?;

        metrics::record_membership_change("added");
        info!(
            conversation_id = %conversation_id,
            actor = %acting_user,
            target = %target,
            role = %role,
            "Participant added"
        );
        Ok(participant)
    }

    /// Record a pending invitation for `target`
    pub async fn invite_participant(
        &self,
        conversation_id: &ConversationId,
        target: &UserId,
        acting_user: &UserId,
        role: ParticipantRole,
    ) -> Result<Participant, AccessError> {
        let _timer = Timer::new("invite_participant");
        self.ensure_user(target).await?;

        let action = Action::AddParticipant { role };
        let participant = self
            .mutate(conversation_id, "invite_participant", |conversation| {
                self.authorize(conversation, acting_user, &action)?;

                if conversation.participants.live(target).is_some() {
                    return Err(AccessError::AlreadyParticipant(target.clone()));
                }
                let record = Participant::invited(target.clone(), role, acting_user.clone());
                conversation
                    .participants
                    .push(record.clone())
                    .map_err(|e| registry_violation(conversation_id, e))?;
                Ok(record)
            })
            .await?;

        metrics::record_membership_change("invited");
        info!(
            conversation_id = %conversation_id,
            actor = %acting_user,
            target = %target,
            role = %role,
            "Participant invited"
        );
        Ok(participant)
    }

    /// Turn the pending invitation of `user_id` into an active membership
    pub async fn accept_invitation(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Participant, AccessError> {
        let _timer = Timer::new("accept_invitation");

        let participant = self
            .mutate(conversation_id, "accept_invitation", |conversation| {
                match conversation.participants.live(user_id).map(|p| p.status) {
                    Some(ParticipantStatus::Invited) => conversation
                        .participants
                        .activate(user_id, None)
                        .map(Participant::clone)
                        .map_err(|e| registry_violation(conversation_id, e)),
                    Some(_) => Err(AccessError::AlreadyParticipant(user_id.clone())),
                    None => Err(AccessError::NotParticipant(user_id.clone())),
                }
            })
            .await?;

        metrics::record_membership_change("accepted");
        info!(conversation_id = %conversation_id, user = %user_id, "Invitation accepted");
        Ok(participant)
    }

    /// Remove an active participant
    pub async fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        target: &UserId,
        acting_user: &UserId,
    ) -> Result<(), AccessError> {
        let _timer = Timer::new("remove_participant");

        let action = Action::RemoveParticipant {
            target: target.clone(),
        };
        self.mutate(conversation_id, "remove_participant", |conversation| {
            self.authorize(conversation, acting_user, &action)?;

            if !conversation.participants.is_active(target) {
                return Err(AccessError::NotParticipant(target.clone()));
            }
            if conversation.is_group() && conversation.participants.is_sole_active_admin(target) {
                return Err(AccessError::WouldOrphanAdmin(conversation_id.clone()));
            }
            conversation
                .participants
                .mark_removed(target)
                .map_err(|e| registry_violation(conversation_id, e))
        })
        .await?;

        metrics::record_membership_change("removed");
        info!(
            conversation_id = %conversation_id,
            actor = %acting_user,
            target = %target,
            "Participant removed"
        );
        Ok(())
    }

    /// Change the role of an active participant
    pub async fn update_participant_role(
        &self,
        conversation_id: &ConversationId,
        target: &UserId,
        new_role: ParticipantRole,
        acting_user: &UserId,
    ) -> Result<Participant, AccessError> {
        let _timer = Timer::new("update_participant_role");

        let action = Action::UpdateRole {
            target: target.clone(),
            new_role,
        };
        let participant = self
            .mutate(conversation_id, "update_participant_role", |conversation| {
                self.authorize(conversation, acting_user, &action)?;

                if !conversation.participants.is_active(target) {
                    return Err(AccessError::NotParticipant(target.clone()));
                }
                if conversation.is_group()
                    && new_role != ParticipantRole::Admin
                    && conversation.participants.is_sole_active_admin(target)
                {
                    return Err(AccessError::WouldOrphanAdmin(conversation_id.clone()));
                }
                conversation
                    .participants
                    .set_role(target, new_role)
                    .map_err(|e| registry_violation(conversation_id, e))?;
                conversation
                    .participants
                    .active(target)
                    .cloned()
                    .ok_or_else(|| AccessError::NotParticipant(target.clone()))
            })
            .await?;

        metrics::record_membership_change("role_updated");
        info!(
            conversation_id = %conversation_id,
            actor = %acting_user,
            target = %target,
            role = %new_role,
            "Participant role updated"
        );
        Ok(participant)
    }

    /// Issue a new join link, invalidating any previous one
    ///
    /// `expires_in_days` defaults to `access.default_link_expiry_days`.
    pub async fn generate_join_link(
        &self,
        conversation_id: &ConversationId,
        acting_user: &UserId,
        expires_in_days: Option<u32>,
        usage_limit: Option<u32>,
    ) -> Result<JoinLink, AccessError> {
        let _timer = Timer::new("generate_join_link");

        let expires_in_days = expires_in_days.unwrap_or(self.config.default_link_expiry_days);
        self.tokens.validate(expires_in_days, usage_limit)?;

        // Refuse before drawing tokens; the decision is re-checked under the lock
        let current = self.load_required(conversation_id).await?;
        self.authorize(&current, acting_user, &Action::GenerateJoinLink)?;

        let store = self.store.clone();
        let link = self
            .tokens
            .issue_unique(acting_user.clone(), expires_in_days, usage_limit, move |token| {
                let store = store.clone();
                async move { Ok::<bool, AccessError>(store.find_by_token(&token).await?.is_some()) }
            })
            .await?;

        let previous = self
            .mutate(conversation_id, "generate_join_link", |conversation| {
                self.check(conversation, acting_user, &Action::GenerateJoinLink)?;
                Ok(conversation
                    .replace_join_link(link.clone())
                    .map(|old| old.token.fingerprint()))
            })
            .await?;

        metrics::record_link_generated();
        info!(
            conversation_id = %conversation_id,
            actor = %acting_user,
            fingerprint = %link.token.fingerprint(),
            replaced = ?previous,
            expires_at = %link.expires_at,
            usage_limit = ?link.usage_limit,
            "Join link generated"
        );
        Ok(link)
    }

    /// Join the conversation whose live link carries `token`
    pub async fn join_by_token(
        &self,
        token: &JoinToken,
        user_id: &UserId,
    ) -> Result<JoinOutcome, AccessError> {
        let _timer = Timer::new("join_by_token");
        self.ensure_user(user_id).await?;

        let Some(conversation_id) = self.store.find_by_token(token).await? else {
            metrics::record_join(Some("unknown"));
            info!(fingerprint = %token.fingerprint(), user = %user_id, "Join with unknown token");
            return Err(AccessError::InvalidOrExpiredLink);
        };

        let count_rejoins = self.config.count_rejoins;
        let outcome = self
            .mutate(&conversation_id, "join_by_token", |conversation| {
                let now = Timestamp::now();
                let already_active = conversation.participants.is_active(user_id);
                let fixed = conversation.is_direct();

                let usage_count = {
                    let link = conversation
                        .join_link_mut()
                        .filter(|link| link.token.matches(token) && !fixed)
                        .ok_or_else(|| {
                            metrics::record_join(Some("replaced"));
                            AccessError::InvalidOrExpiredLink
                        })?;

                    let consumed = if already_active && !count_rejoins {
                        link.check_valid_at(now).map(|_| link.usage_count)
                    } else {
                        link.try_consume_at(now)
                    };
                    consumed.map_err(|rejection| {
                        metrics::record_join(Some(rejection.as_str()));
                        info!(
                            conversation_id = %conversation_id,
                            fingerprint = %token.fingerprint(),
                            user = %user_id,
                            reason = rejection.as_str(),
                            "Join link refused"
                        );
                        AccessError::InvalidOrExpiredLink
                    })?
                };

                let registry = &mut conversation.participants;
                let participant = if already_active {
                    registry.active(user_id).cloned()
                } else if registry.live(user_id).is_some() {
                    registry
                        .activate(user_id, None)
                        .map(Participant::clone)
                        .map(Some)
                        .map_err(|e| registry_violation(&conversation_id, e))?
                } else {
                    let record =
                        Participant::active(user_id.clone(), ParticipantRole::Member, None);
                    registry
                        .push(record.clone())
                        .map_err(|e| registry_violation(&conversation_id, e))?;
                    Some(record)
                };

                let participant =
                    participant.ok_or_else(|| AccessError::NotParticipant(user_id.clone()))?;
                Ok(JoinOutcome {
                    conversation_id: conversation_id.clone(),
                    participant,
                    usage_count,
                    newly_joined: !already_active,
                })
            })
            .await?;

        metrics::record_join(None);
        if outcome.newly_joined {
            metrics::record_membership_change("joined");
        }
        info!(
            conversation_id = %outcome.conversation_id,
            fingerprint = %token.fingerprint(),
            user = %user_id,
            usage_count = outcome.usage_count,
            newly_joined = outcome.newly_joined,
            "Joined through link"
        );
        Ok(outcome)
    }

    /// Capability query for UIs
    ///
    /// A caller without a live record gets `false`, not an error.
    pub async fn evaluate(
        &self,
        conversation_id: &ConversationId,
        acting_user: &UserId,
        action: &Action,
    ) -> Result<bool, AccessError> {
        let conversation = self.load_required(conversation_id).await?;
        Ok(conversation
            .participant(acting_user)
            .map(|acting| self.engine.can_perform(&conversation, acting, action))
            .unwrap_or(false))
    }

    async fn ensure_user(&self, user_id: &UserId) -> Result<(), AccessError> {
        if self.directory.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(AccessError::UserNotFound(user_id.clone()))
        }
    }

    async fn load_required(&self, id: &ConversationId) -> Result<Conversation, AccessError> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| AccessError::ConversationNotFound(id.clone()))
    }

    /// Permission check without side effects beyond a deny log line
    fn check(
        &self,
        conversation: &Conversation,
        acting_user: &UserId,
        action: &Action,
    ) -> Result<(), AccessError> {
        let decision = match conversation.participant(acting_user) {
            Some(acting) => self.engine.decide(conversation, acting, action),
            None => Decision::Deny(DenyReason::InactiveActor),
        };

        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                warn!(
                    conversation_id = %conversation.id,
                    user = %acting_user,
                    action = %action.kind(),
                    reason = reason.as_str(),
                    "Permission denied"
                );
                Err(AccessError::Unauthorized {
                    action: action.kind(),
                    user: acting_user.clone(),
                })
            }
        }
    }

    /// Permission check that also records the decision metric
    fn authorize(
        &self,
        conversation: &Conversation,
        acting_user: &UserId,
        action: &Action,
    ) -> Result<(), AccessError> {
        let result = self.check(conversation, acting_user, action);
        metrics::record_decision(action.kind(), result.is_ok());
        result
    }

    /// Apply `apply` to the latest version of a conversation and persist it
    ///
    /// `apply` may run more than once when a concurrent writer wins the save;
    /// it must only touch the conversation it is given. Transitions that
    /// leave the aggregate unchanged are not written.
    async fn mutate<T, F>(
        &self,
        id: &ConversationId,
        operation: &'static str,
        mut apply: F,
    ) -> Result<T, AccessError>
    where
        F: FnMut(&mut Conversation) -> Result<T, AccessError> + Send,
        T: Send,
    {
        let _guard = self.locks.acquire(id, self.config.lock_timeout).await?;

        let mut retries = 0;
        loop {
            let mut conversation = self.load_required(id).await?;
            let before = conversation.clone();
            let expected = conversation.version;

            let value = apply(&mut conversation)?;
            if conversation == before {
                return Ok(value);
            }
            conversation.touch();

            if let Err(e) = conversation.check_invariants() {
                error!(
                    conversation_id = %id,
                    operation,
                    error = %e,
                    "Refusing to persist conversation that breaks invariants"
                );
                return Err(e);
            }

            match self.store.save(&conversation, expected).await {
                Ok(version) => {
                    debug!(conversation_id = %id, operation, version, "Conversation updated");
                    return Ok(value);
                }
                Err(StoreError::StaleVersion { found, .. }) => {
                    metrics::record_save_conflict();
                    if retries >= self.config.max_save_retries {
                        warn!(
                            conversation_id = %id,
                            operation,
                            retries,
                            "Giving up after repeated version conflicts"
                        );
                        return Err(AccessError::VersionConflict(id.clone()));
                    }
                    retries += 1;
                    debug!(
                        conversation_id = %id,
                        operation,
                        expected,
                        found,
                        "Stale conversation version, reapplying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
