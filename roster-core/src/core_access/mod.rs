//! Conversation access control
//!
//! Participant roles, membership transitions and join links for multi-party
//! conversations.
//!
//! ## Architecture
//!
//! - **Conversation**: aggregate owning its participant registry and its single join link
//! - **PermissionEngine**: pure, table-driven decision over (conversation, actor, action)
//! - **TokenGenerator**: CSPRNG join tokens with bounded collision retry
//! - **ConversationAccessService**: the membership state machine, serialised per conversation
//! - **ConversationStore / IdentityDirectory**: persistence and identity collaborators
//!
//! ## Key Design Principles
//!
//! 1. Records are never deleted; removal is a status and re-adding appends
//! 2. A group conversation always keeps at least one active admin
//! 3. Admin is never grantable through add or role update
//! 4. Every transition is one versioned save

pub mod conversation;
pub mod error;
pub mod join_link;
pub mod locks;
pub mod manager;
pub mod participant;
pub mod permission;
pub mod registry;
pub mod service;
pub mod storage;
pub mod token;
pub mod types;

pub use conversation::{
    AddPolicy, Conversation, ConversationSettings, ConversationType, PrivacySettings,
};
pub use error::{AccessError, ErrorKind, StoreError};
pub use join_link::{JoinLink, JoinToken, LinkRejection};
pub use manager::{ConversationStore, IdentityDirectory};
pub use participant::{Participant, ParticipantRole, ParticipantStatus};
pub use permission::{Action, ActionKind, Decision, DenyReason, PermissionEngine, PermissionTable};
pub use registry::{ParticipantRegistry, RegistryError};
pub use service::{ConversationAccessService, JoinOutcome, NewConversation};
pub use storage::{MemoryConversationStore, SqlConversationStore};
pub use token::{OsTokenSource, TokenGenerator, TokenSource};
pub use types::{ConversationId, Timestamp, UserId};
