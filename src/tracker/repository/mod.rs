//! Repository abstraction for tracked-message persistence.
//!
//! The `MessageRepository` trait abstracts storage of open obligations.
//! All mutating operations are atomic at the row level; in particular
//! `find_and_delete` is the primitive that serializes a reaction resolving
//! a row against a concurrent sweep expiring it, so no two callers may both
//! believe they removed the same row.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;

use super::state::{ChatId, MessageId, TrackedMessage};

/// Storage failures.
///
/// `Storage` covers I/O and query failures (transient from the caller's
/// point of view: the next sweep or event retries naturally). `Corruption`
/// signals a structurally invalid row and is logged with context, never
/// propagated past the affected row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store {operation} failed: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
    #[error("corrupt row in store: {0}")]
    Corruption(String),
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption(what.into())
    }
}

/// Durable record of messages awaiting a reaction.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a newly tracked message.
    ///
    /// Inserting a `(chat_id, message_id)` pair that is already tracked is a
    /// no-op: the existing row (and its escalation progress) is kept.
    async fn insert(&self, message: &TrackedMessage) -> Result<(), StoreError>;

    /// Atomically look up and remove a row, returning it if it existed.
    async fn find_and_delete(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<TrackedMessage>, StoreError>;

    /// Full scan of all open obligations.
    async fn all(&self) -> Result<Vec<TrackedMessage>, StoreError>;

    /// Record that reminders up to `escalations_sent` tiers were delivered.
    async fn update_progress(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        escalations_sent: u32,
    ) -> Result<(), StoreError>;

    /// Remove a row, reporting whether one was actually removed.
    async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool, StoreError>;
}
