//! SQLite-backed conversation store

use super::super::conversation::Conversation;
use super::super::error::StoreError;
use super::super::join_link::JoinToken;
use super::super::manager::{ConversationStore, IdentityDirectory};
use super::super::types::{ConversationId, Timestamp, UserId};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use tracing::debug;

/// SQL-based storage for conversations, join tokens and known users
#[derive(Clone)]
pub struct SqlConversationStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlConversationStore {
    /// Create a store over an existing pool and run migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Self::new(pool)
    }

    /// In-memory database; a single connection so every caller sees the same data
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    /// Record a user identity as existing
    pub fn register_user(&self, user_id: &UserId) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)",
            params![user_id.as_str(), Timestamp::now().as_millis() as i64],
        )?;
        Ok(())
    }

    /// Replace the token index row for `conversation` inside `tx`
    fn write_token_index(
        tx: &Transaction<'_>,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        tx.execute(
            "DELETE FROM join_tokens WHERE conversation_id = ?",
            params![conversation.id.as_str()],
        )?;

        if let Some(link) = conversation.join_link() {
            let inserted = tx.execute(
                "INSERT INTO join_tokens (token_key, conversation_id, expires_at) VALUES (?, ?, ?)",
                params![
                    link.token.index_key(),
                    conversation.id.as_str(),
                    link.expires_at.as_millis() as i64,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(StoreError::DuplicateToken);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn encode(conversation: &Conversation, version: u64) -> Result<String, StoreError> {
        let mut stored = conversation.clone();
        stored.version = version;
        Ok(serde_json::to_string(&stored)?)
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let conn = self.pool.get()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT body, version FROM conversations WHERE id = ?",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((body, version)) => {
                let mut conversation: Conversation = serde_json::from_str(&body)?;
                conversation.version = version as u64;
                Ok(Some(conversation))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let body = Self::encode(conversation, conversation.version)?;
        let inserted = tx.execute(
            "INSERT INTO conversations (id, kind, version, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                conversation.id.as_str(),
                conversation.kind.as_str(),
                conversation.version as i64,
                body,
                conversation.created_at.as_millis() as i64,
                conversation.updated_at.as_millis() as i64,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateConversation(conversation.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        Self::write_token_index(&tx, conversation)?;
        tx.commit()?;
        Ok(())
    }

    async fn save(
        &self,
        conversation: &Conversation,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let new_version = expected_version + 1;
        let body = Self::encode(conversation, new_version)?;
        let updated = tx.execute(
            "UPDATE conversations SET version = ?, body = ?, updated_at = ?
             WHERE id = ? AND version = ?",
            params![
                new_version as i64,
                body,
                conversation.updated_at.as_millis() as i64,
                conversation.id.as_str(),
                expected_version as i64,
            ],
        )?;

        if updated == 0 {
            let found: Option<i64> = tx
                .query_row(
                    "SELECT version FROM conversations WHERE id = ?",
                    params![conversation.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match found {
                Some(found) => StoreError::StaleVersion {
                    id: conversation.id.clone(),
                    expected: expected_version,
                    found: found as u64,
                },
                None => StoreError::MissingConversation(conversation.id.clone()),
            });
        }

        Self::write_token_index(&tx, conversation)?;
        tx.commit()?;

        debug!(conversation_id = %conversation.id, version = new_version, "Saved conversation");
        Ok(new_version)
    }

    async fn find_by_token(&self, token: &JoinToken) -> Result<Option<ConversationId>, StoreError> {
        let conn = self.pool.get()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT conversation_id FROM join_tokens WHERE token_key = ?",
                params![token.index_key()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(ConversationId::new))
    }
}

#[async_trait]
impl IdentityDirectory for SqlConversationStore {
    async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?",
            params![user_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
