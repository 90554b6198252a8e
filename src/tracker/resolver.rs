//! Reaction resolver: decides whether an incoming reaction event satisfies
//! a tracked message.

use tracing::{debug, warn};

use crate::telegram::{ChatKind, MessageReactionUpdated};

use super::notifier::Notifier;
use super::repository::{MessageRepository, StoreError};
use super::state::{ChatId, UserId};

/// Emoji sent back on the message once its obligation is satisfied.
pub const ACK_REACTION: &str = "✍️";

/// Outcome of resolving a reaction event.
///
/// `Ignored` is policy, not failure: out-of-scope events and reactions on
/// messages that were never tracked (or already resolved) land here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Satisfied,
    Ignored,
}

/// Resolve a reaction event against the store.
///
/// Preconditions (checked before any store access): the chat is the target
/// supergroup, the reactor is a known user other than the bot, and the new
/// reaction set is non-empty. When they hold and the message is tracked, the
/// row is removed atomically and an acknowledgement reaction is attempted;
/// an ack failure is logged but never un-satisfies the obligation.
pub async fn resolve_reaction(
    repo: &dyn MessageRepository,
    notifier: &dyn Notifier,
    event: &MessageReactionUpdated,
    bot_id: UserId,
    target_chat: ChatId,
) -> Result<ReactionOutcome, StoreError> {
    if event.chat.kind != ChatKind::Supergroup || event.chat.id != target_chat {
        return Ok(ReactionOutcome::Ignored);
    }
    match &event.user {
        Some(user) if user.id != bot_id => {}
        _ => return Ok(ReactionOutcome::Ignored),
    }
    if event.new_reaction.is_empty() {
        // Only removals; the obligation stands.
        return Ok(ReactionOutcome::Ignored);
    }

    // The existence check and the delete must be one atomic step so that two
    // racing reaction events cannot both acknowledge.
    match repo.find_and_delete(event.chat.id, event.message_id).await? {
        Some(row) => {
            debug!(
                chat_id = %row.chat_id,
                message_id = %row.message_id,
                "tracked message satisfied by reaction"
            );
            if let Err(e) = notifier
                .react(event.chat.id, event.message_id, ACK_REACTION)
                .await
            {
                warn!(
                    chat_id = %event.chat.id,
                    message_id = %event.message_id,
                    "acknowledgement reaction failed: {e}"
                );
            }
            Ok(ReactionOutcome::Satisfied)
        }
        None => Ok(ReactionOutcome::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::repository::InMemoryRepository;
    use crate::tracker::state::{MessageId, TrackedMessage};
    use crate::tracker::test_support::{reaction_event, RecordingNotifier};

    const BOT: UserId = UserId(999);
    const CHAT: ChatId = ChatId(-1001234);

    fn tracked(message_id: i64) -> TrackedMessage {
        TrackedMessage {
            chat_id: CHAT,
            message_id: MessageId(message_id),
            author_id: UserId(777),
            posted_at: 1_700_000_000,
            escalations_sent: 0,
        }
    }

    #[tokio::test]
    async fn reaction_on_tracked_message_satisfies_and_acknowledges() {
        let repo = InMemoryRepository::new();
        let notifier = RecordingNotifier::new();
        repo.insert(&tracked(55)).await.unwrap();

        let outcome = resolve_reaction(&repo, &notifier, &reaction_event(CHAT, 55, 888), BOT, CHAT)
            .await
            .unwrap();

        assert_eq!(outcome, ReactionOutcome::Satisfied);
        assert!(repo.all().await.unwrap().is_empty());
        assert_eq!(
            *notifier.reactions.lock().unwrap(),
            vec![(CHAT, MessageId(55), ACK_REACTION.to_string())]
        );
    }

    #[tokio::test]
    async fn reaction_on_untracked_message_is_ignored_without_side_effects() {
        let repo = InMemoryRepository::new();
        let notifier = RecordingNotifier::new();
        repo.insert(&tracked(55)).await.unwrap();

        let outcome = resolve_reaction(&repo, &notifier, &reaction_event(CHAT, 56, 888), BOT, CHAT)
            .await
            .unwrap();

        assert_eq!(outcome, ReactionOutcome::Ignored);
        assert_eq!(repo.all().await.unwrap().len(), 1);
        assert!(notifier.reactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_scope_events_never_touch_the_store() {
        let repo = InMemoryRepository::new();
        let notifier = RecordingNotifier::new();
        repo.insert(&tracked(55)).await.unwrap();

        // Wrong chat.
        let other_chat = reaction_event(ChatId(-42), 55, 888);
        // The bot's own reaction.
        let own = reaction_event(CHAT, 55, BOT.0);
        // Anonymous reactor.
        let mut anonymous = reaction_event(CHAT, 55, 888);
        anonymous.user = None;
        // Reaction removal only.
        let mut removal = reaction_event(CHAT, 55, 888);
        removal.new_reaction.clear();

        for event in [other_chat, own, anonymous, removal] {
            let outcome = resolve_reaction(&repo, &notifier, &event, BOT, CHAT)
                .await
                .unwrap();
            assert_eq!(outcome, ReactionOutcome::Ignored);
        }
        assert_eq!(repo.all().await.unwrap().len(), 1);
        assert!(notifier.reactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_racing_reactions_acknowledge_exactly_once() {
        let repo = std::sync::Arc::new(InMemoryRepository::new());
        let notifier = std::sync::Arc::new(RecordingNotifier::new());
        repo.insert(&tracked(55)).await.unwrap();

        let event = reaction_event(CHAT, 55, 888);
        let (a, b) = tokio::join!(
            resolve_reaction(repo.as_ref(), notifier.as_ref(), &event, BOT, CHAT),
            resolve_reaction(repo.as_ref(), notifier.as_ref(), &event, BOT, CHAT),
        );

        let satisfied = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| **o == ReactionOutcome::Satisfied)
            .count();
        assert_eq!(satisfied, 1);
        assert_eq!(notifier.reactions.lock().unwrap().len(), 1);
    }
}
