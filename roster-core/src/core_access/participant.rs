//! Participant records, roles and membership status

use super::error::AccessError;
use super::types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversation-level roles
///
/// Variants are declared lowest privilege first so that `Ord` follows the
/// hierarchy `Member < Moderator < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Default role, can participate in the conversation
    Member,
    /// Can add participants (policy permitting) and remove plain members
    Moderator,
    /// Full control over membership, roles and join links
    Admin,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Member => "member",
            ParticipantRole::Moderator => "moderator",
            ParticipantRole::Admin => "admin",
        }
    }
}

impl Default for ParticipantRole {
    fn default() -> Self {
        ParticipantRole::Member
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(ParticipantRole::Member),
            "moderator" => Ok(ParticipantRole::Moderator),
            "admin" => Ok(ParticipantRole::Admin),
            other => Err(AccessError::validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Membership lifecycle: `Invited -> Active -> Removed`
///
/// `Removed` is terminal. Re-adding a removed user creates a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Active,
    Removed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Active => "active",
            ParticipantStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's membership record within one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// User this record belongs to
    pub user_id: UserId,

    /// Role within the conversation
    pub role: ParticipantRole,

    /// Lifecycle status
    pub status: ParticipantStatus,

    /// When the record became active (or was created, for invitations)
    pub joined_at: Timestamp,

    /// Who added or invited this participant; `None` for creators and self-joins
    pub added_by: Option<UserId>,

    /// When the record was moved to `Removed`
    pub removed_at: Option<Timestamp>,
}

impl Participant {
    pub fn active(user_id: UserId, role: ParticipantRole, added_by: Option<UserId>) -> Self {
        Participant {
            user_id,
            role,
            status: ParticipantStatus::Active,
            joined_at: Timestamp::now(),
            added_by,
            removed_at: None,
        }
    }

    pub fn invited(user_id: UserId, role: ParticipantRole, invited_by: UserId) -> Self {
        Participant {
            user_id,
            role,
            status: ParticipantStatus::Invited,
            joined_at: Timestamp::now(),
            added_by: Some(invited_by),
            removed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    /// True for records that still occupy the user's membership slot
    pub fn is_live(&self) -> bool {
        self.status != ParticipantStatus::Removed
    }

    pub fn is_active_admin(&self) -> bool {
        self.is_active() && self.role == ParticipantRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(ParticipantRole::Member < ParticipantRole::Moderator);
        assert!(ParticipantRole::Moderator < ParticipantRole::Admin);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<ParticipantRole>().unwrap(), ParticipantRole::Admin);
        assert_eq!(
            "Moderator".parse::<ParticipantRole>().unwrap(),
            ParticipantRole::Moderator
        );
        assert!("owner".parse::<ParticipantRole>().is_err());
    }

    #[test]
    fn test_role_serde_is_snake_case() {
        let json = serde_json::to_string(&ParticipantRole::Moderator).unwrap();
        assert_eq!(json, "\"moderator\"");
    }

    #[test]
    fn test_status_predicates() {
        let mut p = Participant::invited(
            UserId::from("bob"),
            ParticipantRole::Member,
            UserId::from("alice"),
        );
        assert!(!p.is_active());
        assert!(p.is_live());

        p.status = ParticipantStatus::Removed;
        assert!(!p.is_live());
    }
}
