//! Shared helpers for tracker tests: wire-type builders and a recording
//! `Notifier` whose behavior per reply target is configurable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::telegram::{Chat, ChatKind, ForumTopicCreated, Message, MessageReactionUpdated, User};

use super::notifier::{Notifier, NotifyError, SentMessage};
use super::state::{ChatId, MessageId, UserId};

/// The forum-topic-creation marker for `topic_name` in `chat`.
pub fn reply_marker(chat: ChatId, topic_name: &str) -> Message {
    Message {
        message_id: MessageId(3),
        date: 1_690_000_000,
        chat: Chat {
            id: chat,
            kind: ChatKind::Supergroup,
        },
        from: None,
        text: None,
        caption: None,
        reply_to_message: None,
        is_topic_message: Some(true),
        forum_topic_created: Some(ForumTopicCreated {
            name: topic_name.to_string(),
        }),
    }
}

/// A user message posted as a reply inside the designated topic.
pub fn topic_message(
    chat: ChatId,
    message_id: i64,
    from: i64,
    text: &str,
    topic_name: &str,
) -> Message {
    Message {
        message_id: MessageId(message_id),
        date: 1_700_000_000,
        chat: Chat {
            id: chat,
            kind: ChatKind::Supergroup,
        },
        from: Some(User {
            id: UserId(from),
            is_bot: false,
            username: None,
        }),
        text: Some(text.to_string()),
        caption: None,
        reply_to_message: Some(Box::new(reply_marker(chat, topic_name))),
        is_topic_message: Some(true),
        forum_topic_created: None,
    }
}

/// A reaction update adding one emoji reaction.
pub fn reaction_event(chat: ChatId, message_id: i64, from: i64) -> MessageReactionUpdated {
    MessageReactionUpdated {
        chat: Chat {
            id: chat,
            kind: ChatKind::Supergroup,
        },
        message_id: MessageId(message_id),
        date: 1_700_000_500,
        user: Some(User {
            id: UserId(from),
            is_bot: false,
            username: None,
        }),
        old_reaction: vec![],
        new_reaction: vec![crate::telegram::ReactionType::Emoji {
            emoji: "👍".to_string(),
        }],
    }
}

/// How the mock behaves when asked to send a message replying to a given
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    /// Deliver with the reply linkage confirmed.
    Deliver,
    /// Deliver, but report the reply linkage as lost.
    DeliverWithoutLinkage,
    /// Fail with `NotifyError::BrokenLinkage`.
    BrokenLinkage,
    /// Fail with `NotifyError::Transport`.
    Transport,
}

/// Recording mock for `Notifier`.
pub struct RecordingNotifier {
    next_message_id: AtomicI64,
    behaviors: Mutex<HashMap<MessageId, SendBehavior>>,
    pub sent: Mutex<Vec<(ChatId, String, Option<MessageId>)>>,
    pub deleted: Mutex<Vec<(ChatId, MessageId)>>,
    pub reactions: Mutex<Vec<(ChatId, MessageId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(5_000),
            behaviors: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
        }
    }

    /// Configure how sends replying to `reply_to` behave.
    pub fn behave(&self, reply_to: MessageId, behavior: SendBehavior) {
        self.behaviors.lock().unwrap().insert(reply_to, behavior);
    }

    /// Reminders sent (sends that replied to some message).
    pub fn reminders(&self) -> Vec<(ChatId, String, MessageId)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(chat, text, reply_to)| {
                reply_to.map(|target| (*chat, text.clone(), target))
            })
            .collect()
    }

    /// Terminal notices sent (sends without a reply target).
    pub fn terminal_notices(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, reply_to)| reply_to.is_none())
            .count()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, NotifyError> {
        let behavior = reply_to
            .and_then(|target| self.behaviors.lock().unwrap().get(&target).copied())
            .unwrap_or(SendBehavior::Deliver);

        match behavior {
            SendBehavior::BrokenLinkage => {
                return Err(NotifyError::BrokenLinkage(
                    "message to be replied not found".to_string(),
                ))
            }
            SendBehavior::Transport => {
                return Err(NotifyError::Transport("connection reset".to_string()))
            }
            SendBehavior::Deliver | SendBehavior::DeliverWithoutLinkage => {}
        }

        self.sent
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), reply_to));
        Ok(SentMessage {
            message_id: MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)),
            reply_linkage_intact: behavior == SendBehavior::Deliver,
        })
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<bool, NotifyError> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(true)
    }

    async fn react(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), NotifyError> {
        self.reactions
            .lock()
            .unwrap()
            .push((chat_id, message_id, emoji.to_string()));
        Ok(())
    }
}
