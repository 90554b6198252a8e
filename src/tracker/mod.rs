//! Message lifecycle tracker.
//!
//! This module implements the core of the bot: deciding which messages to
//! track (`filter`), resolving inbound reactions against tracked messages
//! (`resolver`), and the periodic escalation sweep (`sweeper`) that reminds
//! authors daily until a reaction arrives or the retention window lapses.
//!
//! The design separates:
//! - **State**: what the tracker knows about a message (`TrackedMessage`,
//!   escalation progress) and the pure classification of a row at sweep time
//!   (`EscalationState`).
//! - **Store**: durable record of open obligations (`repository`).
//! - **Gateway**: outbound chat operations behind the `Notifier` trait, so
//!   the escalation policy can be tested without a live platform.

pub mod filter;
pub mod notifier;
pub mod repository;
pub mod resolver;
pub mod state;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

pub use notifier::{Notifier, NotifyError, SentMessage};
pub use repository::{InMemoryRepository, MessageRepository, SqliteRepository, StoreError};
pub use state::{classify, ChatId, EscalationState, MessageId, TrackedMessage, UserId};
