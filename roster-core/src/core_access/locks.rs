//! Per-conversation mutual exclusion

use super::error::AccessError;
use super::types::ConversationId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries beyond this count trigger a sweep of idle locks
const SWEEP_THRESHOLD: usize = 1024;

/// Lock table keyed by conversation
///
/// Mutations on one conversation run one at a time; different conversations
/// never contend. Idle entries are dropped lazily once the table grows.
#[derive(Default)]
pub struct ConversationLocks {
    table: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting at most `timeout`
    pub async fn acquire(
        &self,
        id: &ConversationId,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, AccessError> {
        let lock = {
            let mut table = self.table.lock().await;
            if table.len() > SWEEP_THRESHOLD {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table.entry(id.clone()).or_default().clone()
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| AccessError::Busy(id.clone()))
    }

    /// Number of tracked conversations
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_access::error::ErrorKind;

    #[tokio::test]
    async fn test_same_conversation_times_out_while_held() {
        let locks = ConversationLocks::new();
        let id = ConversationId::new("c1");

        let _held = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();
        let err = locks
            .acquire(&id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_different_conversations_do_not_contend() {
        let locks = ConversationLocks::new();
        let _a = locks
            .acquire(&ConversationId::new("a"), Duration::from_millis(20))
            .await
            .unwrap();
        let _b = locks
            .acquire(&ConversationId::new("b"), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_released_lock_can_be_reacquired() {
        let locks = ConversationLocks::new();
        let id = ConversationId::new("c1");
        drop(locks.acquire(&id, Duration::from_millis(20)).await.unwrap());
        assert!(locks.acquire(&id, Duration::from_millis(20)).await.is_ok());
    }
}
