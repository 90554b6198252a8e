//! Telegram Bot API client and wire types.
//!
//! Thin I/O wrapper around the HTTP Bot API: long polling for updates,
//! sending/deleting messages and setting reactions. The tracker consumes
//! this through the `Notifier` trait; nothing here contains policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracker::{ChatId, MessageId, Notifier, NotifyError, SentMessage, UserId};

const API_BASE: &str = "https://api.telegram.org";

/// Extra headroom over the long-poll timeout before reqwest gives up.
const REQUEST_TIMEOUT_SLACK_SECS: u64 = 10;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub message_reaction: Option<MessageReactionUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub date: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
    #[serde(default)]
    pub is_topic_message: Option<bool>,
    #[serde(default)]
    pub forum_topic_created: Option<ForumTopicCreated>,
}

impl Message {
    /// Text or caption content, whichever the message carries.
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// The platform's synthetic marker for a forum topic's creation. A message
/// replying to this marker belongs to that topic.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumTopicCreated {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReactionUpdated {
    pub chat: Chat,
    pub message_id: MessageId,
    pub date: i64,
    /// Absent when the reactor is anonymous (a channel acting as a user).
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub old_reaction: Vec<ReactionType>,
    #[serde(default)]
    pub new_reaction: Vec<ReactionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionType {
    Emoji { emoji: String },
    CustomEmoji { custom_emoji_id: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct ReplyParameters {
    message_id: MessageId,
    /// Deliver the message even when the reply target is gone; the missing
    /// `reply_to_message` in the response is how we detect lost linkage.
    allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
}

#[derive(Debug, Serialize)]
struct DeleteMessageRequest {
    chat_id: ChatId,
    message_id: MessageId,
}

#[derive(Debug, Serialize)]
struct SetMessageReactionRequest<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    reaction: [ReactionRef<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ReactionRef<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    emoji: &'a str,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TelegramError {
    /// Whether this error means the message we tried to reply to is gone.
    ///
    /// The Bot API reports this as a 400 with a description along the lines
    /// of "message to be replied not found".
    pub fn is_broken_linkage(&self) -> bool {
        match self {
            Self::Api { code, description } => {
                let description = description.to_ascii_lowercase();
                *code == 400 && description.contains("repl") && description.contains("not found")
            }
            Self::Transport(_) => false,
        }
    }
}

fn into_notify(e: TelegramError) -> NotifyError {
    if e.is_broken_linkage() {
        NotifyError::BrokenLinkage(e.to_string())
    } else {
        NotifyError::Transport(e.to_string())
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, API_BASE)
    }

    /// Point the client at a different API host (used by tests).
    pub fn with_base_url(token: &str, base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", base.trim_end_matches('/'), token),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
        timeout: Duration,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let api: ApiResponse<T> = response.json().await?;
        if !api.ok {
            return Err(TelegramError::Api {
                code: api.error_code.unwrap_or(0),
                description: api
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }
        api.result.ok_or(TelegramError::Api {
            code: 0,
            description: "response was ok but carried no result".to_string(),
        })
    }

    /// Identify the bot account. Used once at startup to learn the bot's
    /// own user id for the eligibility and resolver checks.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({}), Duration::from_secs(10))
            .await
    }

    /// Long-poll for updates past `offset`, limited to the update kinds the
    /// tracker consumes.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message", "message_reaction"],
        };
        self.call(
            "getUpdates",
            &request,
            Duration::from_secs(timeout_secs + REQUEST_TIMEOUT_SLACK_SECS),
        )
        .await
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, NotifyError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_parameters: reply_to.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
        };
        let sent: Message = self
            .call("sendMessage", &request, Duration::from_secs(30))
            .await
            .map_err(into_notify)?;
        Ok(SentMessage {
            message_id: sent.message_id,
            reply_linkage_intact: reply_to.is_none() || sent.reply_to_message.is_some(),
        })
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<bool, NotifyError> {
        let request = DeleteMessageRequest {
            chat_id,
            message_id,
        };
        self.call("deleteMessage", &request, Duration::from_secs(30))
            .await
            .map_err(into_notify)
    }

    async fn react(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), NotifyError> {
        let request = SetMessageReactionRequest {
            chat_id,
            message_id,
            reaction: [ReactionRef {
                kind: "emoji",
                emoji,
            }],
        };
        let _: bool = self
            .call("setMessageReaction", &request, Duration::from_secs(30))
            .await
            .map_err(into_notify)?;
        Ok(())
    }
}
