//! Conversation aggregate
//!
//! A conversation owns its participant registry and its (at most one) join
//! link. All membership state lives here so that a single versioned save is
//! enough to apply a transition atomically.

use super::error::AccessError;
use super::join_link::JoinLink;
use super::participant::{Participant, ParticipantRole};
use super::registry::ParticipantRegistry;
use super::types::{ConversationId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a conversation name in bytes
pub const MAX_NAME_LEN: usize = 100;

/// Kind of conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// One-to-one; exactly two participants, membership is fixed
    Direct,
    /// Named multi-party conversation with role enforcement
    Group,
    Support,
    Announcement,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationType::Direct => "direct",
            ConversationType::Group => "group",
            ConversationType::Support => "support",
            ConversationType::Announcement => "announcement",
        }
    }
}

impl fmt::Display for ConversationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversationType {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(ConversationType::Direct),
            "group" => Ok(ConversationType::Group),
            "support" => Ok(ConversationType::Support),
            "announcement" => Ok(ConversationType::Announcement),
            other => Err(AccessError::validation(format!(
                "unknown conversation type '{}'",
                other
            ))),
        }
    }
}

/// Who may add participants besides admins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddPolicy {
    AdminsOnly,
    ModeratorsAndAdmins,
    AllMembers,
}

impl AddPolicy {
    /// Lowest role allowed to add participants under this policy
    pub fn minimum_role(&self) -> ParticipantRole {
        match self {
            AddPolicy::AdminsOnly => ParticipantRole::Admin,
            AddPolicy::ModeratorsAndAdmins => ParticipantRole::Moderator,
            AddPolicy::AllMembers => ParticipantRole::Member,
        }
    }
}

impl Default for AddPolicy {
    fn default() -> Self {
        AddPolicy::AdminsOnly
    }
}

impl FromStr for AddPolicy {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admins_only" => Ok(AddPolicy::AdminsOnly),
            "moderators_and_admins" => Ok(AddPolicy::ModeratorsAndAdmins),
            "all_members" => Ok(AddPolicy::AllMembers),
            other => Err(AccessError::validation(format!(
                "unknown add policy '{}'",
                other
            ))),
        }
    }
}

/// Conversation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub who_can_add_participants: AddPolicy,
}

/// Privacy settings; holds the single join link slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub join_link: Option<JoinLink>,
}

/// Conversation with its participants and join link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,

    pub kind: ConversationType,

    /// Required for groups
    pub name: Option<String>,

    pub settings: ConversationSettings,

    pub participants: ParticipantRegistry,

    pub privacy: PrivacySettings,

    pub created_by: UserId,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,

    /// Optimistic concurrency counter, bumped by the store on every save
    pub version: u64,
}

impl Conversation {
    /// Build a new conversation
    ///
    /// The creator becomes admin, except in direct conversations where both
    /// sides are plain members. `members` are added as active members.
    pub fn create(
        kind: ConversationType,
        name: Option<String>,
        creator: UserId,
        members: Vec<UserId>,
        settings: ConversationSettings,
    ) -> Result<Self, AccessError> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Self::validate_name(kind, name.as_deref())?;

        let mut participants = ParticipantRegistry::new();
        let creator_role = match kind {
            ConversationType::Direct => ParticipantRole::Member,
            _ => ParticipantRole::Admin,
        };
        participants
            .push(Participant::active(creator.clone(), creator_role, None))
            .map_err(|e| AccessError::validation(e.to_string()))?;

        if kind == ConversationType::Direct && members.len() != 1 {
            return Err(AccessError::validation(
                "direct conversations need exactly one other participant",
            ));
        }

        for member in members {
            participants
                .push(Participant::active(
                    member,
                    ParticipantRole::Member,
                    Some(creator.clone()),
                ))
                .map_err(|e| AccessError::validation(e.to_string()))?;
        }

        let now = Timestamp::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            kind,
            name,
            settings,
            participants,
            privacy: PrivacySettings::default(),
            created_by: creator,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        conversation.check_invariants()?;
        Ok(conversation)
    }

    fn validate_name(kind: ConversationType, name: Option<&str>) -> Result<(), AccessError> {
        match (kind, name) {
            (ConversationType::Group, None) => {
                Err(AccessError::validation("group conversations require a name"))
            }
            (_, Some(n)) if n.len() > MAX_NAME_LEN => Err(AccessError::validation(format!(
                "name must be at most {} bytes",
                MAX_NAME_LEN
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationType::Group
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ConversationType::Direct
    }

    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.live(user_id)
    }

    pub fn join_link(&self) -> Option<&JoinLink> {
        self.privacy.join_link.as_ref()
    }

    /// Install a new join link, making any previous one inert
    pub fn replace_join_link(&mut self, link: JoinLink) -> Option<JoinLink> {
        self.touch();
        self.privacy.join_link.replace(link)
    }

    pub(crate) fn join_link_mut(&mut self) -> Option<&mut JoinLink> {
        self.privacy.join_link.as_mut()
    }

    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }

    /// Verify the aggregate's invariants
    pub fn check_invariants(&self) -> Result<(), AccessError> {
        self.participants
            .check_unique_live()
            .map_err(|e| AccessError::InvariantViolation(format!("{}: {}", self.id, e)))?;

        if self.is_direct() && self.participants.active_count() != 2 {
            return Err(AccessError::InvariantViolation(format!(
                "{}: direct conversation must have exactly 2 active participants",
                self.id
            )));
        }

        if self.is_group() && self.participants.active_admin_count() == 0 {
            return Err(AccessError::InvariantViolation(format!(
                "{}: group conversation has no active admin",
                self.id
            )));
        }

        if let Some(link) = self.join_link() {
            if link.usage_limit.map_or(false, |limit| link.usage_count > limit) {
                return Err(AccessError::InvariantViolation(format!(
                    "{}: join link used beyond its limit",
                    self.id
                )));
            }
        }

        Ok(())
    }
}
