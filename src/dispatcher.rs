//! Update dispatcher: the long-polling loop that feeds inbound platform
//! events through the rate limiter and into the tracker.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::telegram::{Message, MessageReactionUpdated, TelegramClient, Update};
use crate::tracker::filter::{in_designated_topic, should_track};
use crate::tracker::resolver::{resolve_reaction, ReactionOutcome};
use crate::tracker::state::{ChatId, TrackedMessage, UserId};
use crate::tracker::{MessageRepository, Notifier};

/// Long-poll wait passed to the platform. The HTTP timeout gets extra slack
/// on top of this inside the client.
const POLL_TIMEOUT_SECS: u64 = 50;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Reaction set on `/start` greetings.
const START_REACTION: &str = "\u{2764}\u{200d}\u{1f525}";

pub struct Dispatcher {
    client: Arc<TelegramClient>,
    repo: Arc<dyn MessageRepository>,
    bot_id: UserId,
    /// Own username, for commands addressed as `/start@<username>`.
    bot_username: Option<String>,
    target_chat: ChatId,
    topic_name: String,
    limiter: DefaultDirectRateLimiter,
}

/// Build a limiter admitting at most `max_updates` per `window`, with the
/// whole allowance available as a burst.
fn update_limiter(window: Duration, max_updates: u32) -> DefaultDirectRateLimiter {
    let max = NonZeroU32::new(max_updates.max(1)).unwrap_or(NonZeroU32::MIN);
    let per_update = window / max.get();
    let quota = Quota::with_period(per_update)
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max);
    RateLimiter::direct(quota)
}

impl Dispatcher {
    pub fn new(
        client: Arc<TelegramClient>,
        repo: Arc<dyn MessageRepository>,
        bot_id: UserId,
        bot_username: Option<String>,
        target_chat: ChatId,
        topic_name: String,
        rate_limit_window: Duration,
        rate_limit_max_updates: u32,
    ) -> Self {
        Self {
            client,
            repo,
            bot_id,
            bot_username,
            target_chat,
            topic_name,
            limiter: update_limiter(rate_limit_window, rate_limit_max_updates),
        }
    }

    /// Poll for updates until the shutdown flag flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(chat_id = %self.target_chat, topic = %self.topic_name, "dispatcher started");
        let mut offset = 0i64;
        loop {
            let poll = tokio::select! {
                result = self.client.get_updates(offset, POLL_TIMEOUT_SECS) => result,
                _ = shutdown.changed() => {
                    info!("dispatcher stopping");
                    return;
                }
            };
            let updates = match poll {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("poll failed, retrying in {}s: {e}", POLL_RETRY_DELAY.as_secs());
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                        _ = shutdown.changed() => {
                            info!("dispatcher stopping");
                            return;
                        }
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if self.limiter.check().is_err() {
                    debug!(update_id = update.update_id, "rate limit exceeded, dropping update");
                    continue;
                }
                self.dispatch(update).await;
            }
        }
    }

    async fn dispatch(&self, update: Update) {
        let Update {
            update_id,
            message,
            message_reaction,
        } = update;
        if let Some(message) = message {
            if let Err(e) = self.handle_message(&message).await {
                error!(update_id, "message handling failed: {e}");
            }
        } else if let Some(event) = message_reaction {
            if let Err(e) = self.handle_reaction(&event).await {
                error!(update_id, "reaction handling failed: {e}");
            }
        }
    }

    async fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
        if message
            .content()
            .map_or(false, |text| is_start_command(text, self.bot_username.as_deref()))
        {
            return self.handle_start(message).await;
        }

        if !should_track(message, self.bot_id, self.target_chat, &self.topic_name) {
            return Ok(());
        }
        let Some(from) = &message.from else {
            return Ok(());
        };
        let row = TrackedMessage {
            chat_id: message.chat.id,
            message_id: message.message_id,
            author_id: from.id,
            posted_at: message.date,
            escalations_sent: 0,
        };
        self.repo.insert(&row).await?;
        info!(
            chat_id = %row.chat_id,
            message_id = %row.message_id,
            author_id = %row.author_id,
            "now tracking message"
        );
        Ok(())
    }

    /// Greet `/start` with a reaction. In a private chat the greeting is
    /// unconditional; in the target supergroup only inside the designated
    /// topic.
    async fn handle_start(&self, message: &Message) -> anyhow::Result<()> {
        use crate::telegram::ChatKind;
        let greet = match message.chat.kind {
            ChatKind::Private => true,
            ChatKind::Supergroup => {
                in_designated_topic(message, self.bot_id, self.target_chat, &self.topic_name)
            }
            _ => false,
        };
        if greet {
            self.client
                .react(message.chat.id, message.message_id, START_REACTION)
                .await?;
        }
        Ok(())
    }

    async fn handle_reaction(&self, event: &MessageReactionUpdated) -> anyhow::Result<()> {
        let outcome = resolve_reaction(
            self.repo.as_ref(),
            self.client.as_ref() as &dyn Notifier,
            event,
            self.bot_id,
            self.target_chat,
        )
        .await?;
        if outcome == ReactionOutcome::Satisfied {
            info!(
                chat_id = %event.chat.id,
                message_id = %event.message_id,
                "message satisfied"
            );
        }
        Ok(())
    }
}

/// Whether `text` is a `/start` command for this bot. A command addressed
/// as `/start@<username>` counts only when the username is ours
/// (case-insensitively); commands addressed to other bots are ignored.
fn is_start_command(text: &str, bot_username: Option<&str>) -> bool {
    let Some(rest) = text.strip_prefix("/start") else {
        return false;
    };
    match rest.as_bytes().first() {
        None | Some(b' ') => true,
        Some(b'@') => {
            let mention = rest[1..].split(' ').next().unwrap_or("");
            bot_username.map_or(false, |own| mention.eq_ignore_ascii_case(own))
        }
        Some(_) => false,
    }
}
