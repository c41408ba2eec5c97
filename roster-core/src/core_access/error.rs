//! Error taxonomy for conversation access control

use super::permission::ActionKind;
use super::types::{ConversationId, UserId};
use std::fmt;

/// Broad category of an [`AccessError`], used by callers to decide how to surface it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input; the caller's fault, never retried
    Validation,
    /// The permission engine denied the action
    Authorization,
    /// Unknown conversation or user
    NotFound,
    /// The request conflicts with current state; the caller may correct and resubmit
    Conflict,
    /// Fatal internal inconsistency; nothing was applied
    InvariantViolation,
    /// A persistence collaborator failed
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::Storage => "storage",
        };
        write!(f, "{}", s)
    }
}

/// Errors returned by access-control operations
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("User {user} is not permitted to {action}")]
    Unauthorized { action: ActionKind, user: UserId },

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User {0} is already a participant")]
    AlreadyParticipant(UserId),

    #[error("User {0} is not an active participant")]
    NotParticipant(UserId),

    #[error("Join link is invalid or expired")]
    InvalidOrExpiredLink,

    #[error("Change would leave conversation {0} without an active admin")]
    WouldOrphanAdmin(ConversationId),

    #[error("Conversation {0} is busy, try again")]
    Busy(ConversationId),

    #[error("Conversation {0} was modified concurrently")]
    VersionConflict(ConversationId),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AccessError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Validation(_) => ErrorKind::Validation,
            AccessError::Unauthorized { .. } => ErrorKind::Authorization,
            AccessError::ConversationNotFound(_) | AccessError::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            AccessError::AlreadyParticipant(_)
            | AccessError::NotParticipant(_)
            | AccessError::InvalidOrExpiredLink
            | AccessError::WouldOrphanAdmin(_)
            | AccessError::Busy(_)
            | AccessError::VersionConflict(_) => ErrorKind::Conflict,
            AccessError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            AccessError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        AccessError::Validation(msg.into())
    }
}

/// Errors raised by [`ConversationStore`](super::manager::ConversationStore) implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Stale version for conversation {id}: expected {expected}, found {found}")]
    StaleVersion {
        id: ConversationId,
        expected: u64,
        found: u64,
    },

    #[error("Conversation already exists: {0}")]
    DuplicateConversation(ConversationId),

    #[error("Conversation does not exist: {0}")]
    MissingConversation(ConversationId),

    #[error("Join token index collision")]
    DuplicateToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Pool(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let user = UserId::from("bob");
        let conv = ConversationId::new("c1");

        assert_eq!(
            AccessError::validation("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AccessError::Unauthorized {
                action: ActionKind::AddParticipant,
                user: user.clone()
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            AccessError::ConversationNotFound(conv.clone()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(AccessError::InvalidOrExpiredLink.kind(), ErrorKind::Conflict);
        assert_eq!(
            AccessError::WouldOrphanAdmin(conv).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AccessError::AlreadyParticipant(user).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AccessError::InvariantViolation("x".into()).kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn test_unauthorized_display_names_action() {
        let err = AccessError::Unauthorized {
            action: ActionKind::GenerateJoinLink,
            user: UserId::from("mallory"),
        };
        assert_eq!(
            err.to_string(),
            "User mallory is not permitted to generate_join_link"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: AccessError = StoreError::DuplicateToken.into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
