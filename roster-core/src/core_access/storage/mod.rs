//! Storage layer for conversations
//!
//! Provides an in-memory store and SQL-based persistence behind the
//! [`ConversationStore`](super::manager::ConversationStore) trait.

pub mod memory;
pub mod migrations;
pub mod sql_store;

pub use memory::MemoryConversationStore;
pub use migrations::{migrate, CURRENT_ACCESS_SCHEMA_VERSION};
pub use sql_store::SqlConversationStore;
