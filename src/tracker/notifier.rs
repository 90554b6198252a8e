//! Abstract interface to the chat platform.
//!
//! The tracker never talks to Telegram directly; it emits sends, deletions
//! and reactions through this trait. The production implementation lives in
//! `crate::telegram`; tests substitute a recording mock.

use async_trait::async_trait;
use thiserror::Error;

use super::state::{ChatId, MessageId};

/// A message the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
    /// Whether the platform confirmed the reply linkage requested for this
    /// send. `false` means the message was delivered but the original it was
    /// supposed to quote no longer exists.
    pub reply_linkage_intact: bool,
}

/// Failure modes of an outbound platform call.
///
/// `BrokenLinkage` is permanent for the affected row (the reply target is
/// gone); `Transport` is transient and retried naturally on the next sweep
/// or event.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("reply target no longer exists: {0}")]
    BrokenLinkage(String),
    #[error("platform call failed: {0}")]
    Transport(String),
}

/// Outbound chat operations the tracker needs.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a text message, optionally quoting `reply_to`.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, NotifyError>;

    /// Delete a message. Returns whether the platform reported a deletion.
    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<bool, NotifyError>;

    /// Set an emoji reaction on a message.
    async fn react(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), NotifyError>;
}
