//! Eligibility filter: decides whether an inbound message starts being
//! tracked.
//!
//! Pure predicates over the wire types; no side effects. Anything malformed
//! or out of scope simply fails the predicate (fail closed), it is never an
//! error.

use crate::telegram::{ChatKind, Message};

use super::state::{ChatId, UserId};

/// Minimum text/caption length (in characters) for a message to be worth
/// nagging about.
pub const MIN_TRACKED_TEXT_LEN: usize = 10;

/// Whether `message` was posted by a regular user inside the designated
/// forum topic of the target supergroup.
///
/// Holds when all of:
/// - the chat is a supergroup and is the configured target chat,
/// - the sender is present and is not the bot itself,
/// - the message replies to the forum-topic-creation marker whose topic
///   name equals the configured one.
pub fn in_designated_topic(
    message: &Message,
    bot_id: UserId,
    target_chat: ChatId,
    topic_name: &str,
) -> bool {
    if message.chat.kind != ChatKind::Supergroup || message.chat.id != target_chat {
        return false;
    }
    match &message.from {
        Some(from) if from.id != bot_id => {}
        _ => return false,
    }
    let Some(reply) = &message.reply_to_message else {
        return false;
    };
    if !reply.is_topic_message.unwrap_or(false) {
        return false;
    }
    match &reply.forum_topic_created {
        Some(topic) => topic.name == topic_name,
        None => false,
    }
}

/// Whether an inbound message should begin being tracked: posted in the
/// designated topic and carrying at least [`MIN_TRACKED_TEXT_LEN`]
/// characters of text or caption.
pub fn should_track(
    message: &Message,
    bot_id: UserId,
    target_chat: ChatId,
    topic_name: &str,
) -> bool {
    if !in_designated_topic(message, bot_id, target_chat, topic_name) {
        return false;
    }
    message
        .content()
        .map_or(false, |content| content.chars().count() >= MIN_TRACKED_TEXT_LEN)
}
