//! In-memory implementation of `MessageRepository`.
//!
//! All state is held in a `HashMap` behind a `RwLock` and lost on restart.
//! Used in tests and useful as a reference for the atomicity contract: every
//! mutating operation holds the write lock for its whole duration, so
//! find-and-delete and delete cannot both win on the same key.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MessageRepository, StoreError};
use crate::tracker::state::{ChatId, MessageId, TrackedMessage};

pub struct InMemoryRepository {
    rows: RwLock<HashMap<(ChatId, MessageId), TrackedMessage>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn insert(&self, message: &TrackedMessage) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if let Entry::Vacant(entry) = rows.entry((message.chat_id, message.message_id)) {
            entry.insert(message.clone());
        }
        Ok(())
    }

    async fn find_and_delete(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<TrackedMessage>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.remove(&(chat_id, message_id)))
    }

    async fn all(&self) -> Result<Vec<TrackedMessage>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().cloned().collect())
    }

    async fn update_progress(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        escalations_sent: u32,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&(chat_id, message_id)) {
            row.escalations_sent = escalations_sent;
        }
        Ok(())
    }

    async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(rows.remove(&(chat_id, message_id)).is_some())
    }
}
