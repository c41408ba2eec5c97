//! Permission engine for membership actions
//!
//! Decisions are a pure function of (conversation, acting participant,
//! action). The role hierarchy is the ordered [`ParticipantRole`] enum and
//! what each role may do is read from a [`PermissionTable`], so the policy can
//! be tested without any storage.
//!
//! Evaluation order, first match wins:
//!
//! 1. the acting participant must be active, and the conversation must not
//!    have fixed membership (direct conversations);
//! 2. `AddParticipant`: admins always; otherwise the conversation's
//!    [`AddPolicy`](super::conversation::AddPolicy) decides, and the granted
//!    role must be one the actor may grant;
//! 3. `RemoveParticipant`: never oneself; otherwise the target's role must
//!    be removable by the actor's role;
//! 4. `UpdateRole`: never one's own role; the new role must be assignable by
//!    the actor's role (admin is never assignable);
//! 5. `GenerateJoinLink`: listed roles only.

use super::conversation::Conversation;
use super::error::AccessError;
use super::participant::{Participant, ParticipantRole};
use super::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Action names, as used in capability queries and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddParticipant,
    RemoveParticipant,
    UpdateRole,
    GenerateJoinLink,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AddParticipant => "add_participant",
            ActionKind::RemoveParticipant => "remove_participant",
            ActionKind::UpdateRole => "update_role",
            ActionKind::GenerateJoinLink => "generate_join_link",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "add_participant" => Ok(ActionKind::AddParticipant),
            "remove_participant" => Ok(ActionKind::RemoveParticipant),
            "update_role" => Ok(ActionKind::UpdateRole),
            "generate_join_link" => Ok(ActionKind::GenerateJoinLink),
            other => Err(AccessError::validation(format!("unknown action '{}'", other))),
        }
    }
}

/// A membership action together with its target and requested role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    AddParticipant { role: ParticipantRole },
    RemoveParticipant { target: UserId },
    UpdateRole { target: UserId, new_role: ParticipantRole },
    GenerateJoinLink,
}

impl Action {
    /// Assemble an action from its loosely-typed parts
    ///
    /// Missing targets are a validation error, not a deny. A missing role
    /// for `AddParticipant` defaults to member.
    pub fn from_parts(
        kind: ActionKind,
        target: Option<UserId>,
        requested_role: Option<ParticipantRole>,
    ) -> Result<Self, AccessError> {
        match kind {
            ActionKind::AddParticipant => Ok(Action::AddParticipant {
                role: requested_role.unwrap_or_default(),
            }),
            ActionKind::RemoveParticipant => {
                let target = target
                    .ok_or_else(|| AccessError::validation("remove_participant needs a target"))?;
                Ok(Action::RemoveParticipant { target })
            }
            ActionKind::UpdateRole => {
                let target =
                    target.ok_or_else(|| AccessError::validation("update_role needs a target"))?;
                let new_role = requested_role
                    .ok_or_else(|| AccessError::validation("update_role needs a role"))?;
                Ok(Action::UpdateRole { target, new_role })
            }
            ActionKind::GenerateJoinLink => Ok(Action::GenerateJoinLink),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AddParticipant { .. } => ActionKind::AddParticipant,
            Action::RemoveParticipant { .. } => ActionKind::RemoveParticipant,
            Action::UpdateRole { .. } => ActionKind::UpdateRole,
            Action::GenerateJoinLink => ActionKind::GenerateJoinLink,
        }
    }
}

/// Reason attached to a denied decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Acting participant is invited or removed
    InactiveActor,
    /// Conversation membership cannot change (direct conversations)
    FixedMembership,
    /// Actor's role is below what the add policy requires
    AddPolicy,
    /// Requested role is above what the actor may grant
    RoleNotGrantable,
    /// Self-removal goes through leave, not remove
    SelfRemoval,
    /// Target's role is not removable by the actor's role
    TargetNotRemovable,
    /// Actor's role may not change roles at all
    RoleChangeNotAllowed,
    /// Nobody may change their own role
    OwnRoleChange,
    /// Requested role may not be assigned
    RoleNotAssignable,
    /// Actor's role may not create join links
    LinkGenerationNotAllowed,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InactiveActor => "inactive_actor",
            DenyReason::FixedMembership => "fixed_membership",
            DenyReason::AddPolicy => "add_policy",
            DenyReason::RoleNotGrantable => "role_not_grantable",
            DenyReason::SelfRemoval => "self_removal",
            DenyReason::TargetNotRemovable => "target_not_removable",
            DenyReason::RoleChangeNotAllowed => "role_change_not_allowed",
            DenyReason::OwnRoleChange => "own_role_change",
            DenyReason::RoleNotAssignable => "role_not_assignable",
            DenyReason::LinkGenerationNotAllowed => "link_generation_not_allowed",
        }
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Role sets indexed by the acting role
pub type RoleSets = [&'static [ParticipantRole]; 3];

fn role_index(role: ParticipantRole) -> usize {
    match role {
        ParticipantRole::Member => 0,
        ParticipantRole::Moderator => 1,
        ParticipantRole::Admin => 2,
    }
}

/// Data-driven policy: for each acting role, the roles it may act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionTable {
    /// Roles an actor may grant when adding a participant
    pub grantable: RoleSets,
    /// Target roles an actor may remove
    pub removable: RoleSets,
    /// Roles an actor may assign through a role update
    pub assignable: RoleSets,
    /// Roles allowed to generate join links
    pub link_generators: &'static [ParticipantRole],
}

impl PermissionTable {
    /// Standard conversation policy
    pub const STANDARD: PermissionTable = PermissionTable {
        grantable: [
            &[ParticipantRole::Member],
            &[ParticipantRole::Member, ParticipantRole::Moderator],
            &[ParticipantRole::Member, ParticipantRole::Moderator],
        ],
        removable: [
            &[],
            &[ParticipantRole::Member],
            &[
                ParticipantRole::Member,
                ParticipantRole::Moderator,
                ParticipantRole::Admin,
            ],
        ],
        assignable: [
            &[],
            &[],
            &[ParticipantRole::Member, ParticipantRole::Moderator],
        ],
        link_generators: &[ParticipantRole::Admin],
    };

    pub fn may_grant(&self, actor: ParticipantRole, role: ParticipantRole) -> bool {
        self.grantable[role_index(actor)].contains(&role)
    }

    pub fn may_remove(&self, actor: ParticipantRole, target: ParticipantRole) -> bool {
        self.removable[role_index(actor)].contains(&target)
    }

    pub fn may_change_roles(&self, actor: ParticipantRole) -> bool {
        !self.assignable[role_index(actor)].is_empty()
    }

    pub fn may_assign(&self, actor: ParticipantRole, role: ParticipantRole) -> bool {
        self.assignable[role_index(actor)].contains(&role)
    }

    pub fn may_generate_link(&self, actor: ParticipantRole) -> bool {
        self.link_generators.contains(&actor)
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        PermissionTable::STANDARD
    }
}

/// Pure permission evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionEngine {
    table: PermissionTable,
}

impl PermissionEngine {
    pub fn new(table: PermissionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }

    /// Whether `acting` may perform `action` on `conversation`
    pub fn can_perform(
        &self,
        conversation: &Conversation,
        acting: &Participant,
        action: &Action,
    ) -> bool {
        self.decide(conversation, acting, action).is_allowed()
    }

    /// Capability query for UI surfaces
    pub fn evaluate(
        &self,
        conversation: &Conversation,
        acting: &Participant,
        action: &Action,
    ) -> bool {
        self.can_perform(conversation, acting, action)
    }

    /// Full decision including the deny reason
    pub fn decide(
        &self,
        conversation: &Conversation,
        acting: &Participant,
        action: &Action,
    ) -> Decision {
        if !acting.is_active() {
            return Decision::Deny(DenyReason::InactiveActor);
        }
        if conversation.is_direct() {
            return Decision::Deny(DenyReason::FixedMembership);
        }

        let actor = acting.role;
        match action {
            Action::AddParticipant { role } => {
                if actor != ParticipantRole::Admin
                    && actor < conversation.settings.who_can_add_participants.minimum_role()
                {
                    return Decision::Deny(DenyReason::AddPolicy);
                }
                if !self.table.may_grant(actor, *role) {
                    return Decision::Deny(DenyReason::RoleNotGrantable);
                }
                Decision::Allow
            }
            Action::RemoveParticipant { target } => {
                if target == &acting.user_id {
                    return Decision::Deny(DenyReason::SelfRemoval);
                }
                let target_role = conversation
                    .participants
                    .live(target)
                    .map(|p| p.role)
                    .unwrap_or(ParticipantRole::Member);
                if !self.table.may_remove(actor, target_role) {
                    return Decision::Deny(DenyReason::TargetNotRemovable);
                }
                Decision::Allow
            }
            Action::UpdateRole { target, new_role } => {
                if !self.table.may_change_roles(actor) {
                    return Decision::Deny(DenyReason::RoleChangeNotAllowed);
                }
                if target == &acting.user_id {
                    return Decision::Deny(DenyReason::OwnRoleChange);
                }
                if !self.table.may_assign(actor, *new_role) {
                    return Decision::Deny(DenyReason::RoleNotAssignable);
                }
                Decision::Allow
            }
            Action::GenerateJoinLink => {
                if !self.table.may_generate_link(actor) {
                    return Decision::Deny(DenyReason::LinkGenerationNotAllowed);
                }
                Decision::Allow
            }
        }
    }
}
