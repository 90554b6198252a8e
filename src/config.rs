use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::tracker::ChatId;

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    /// The supergroup the bot watches.
    pub target_chat: ChatId,
    /// Name of the forum topic whose messages are tracked.
    pub topic_name: String,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// How often the escalation sweep runs.
    pub sweep_interval: Duration,
    /// Inbound rate limit: at most `rate_limit_max_updates` updates are
    /// processed per `rate_limit_window`; excess updates are dropped.
    pub rate_limit_window: Duration,
    pub rate_limit_max_updates: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("BOT_TOKEN").context("BOT_TOKEN environment variable is required")?;

        let target_chat = env::var("CHAT_ID")
            .context("CHAT_ID environment variable is required")?
            .parse::<i64>()
            .map(ChatId)
            .context("CHAT_ID must be a valid number")?;

        let topic_name =
            env::var("TOPIC_NAME").context("TOPIC_NAME environment variable is required")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let sweep_interval = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("SWEEP_INTERVAL_SECS must be a valid number")?;

        let rate_limit_window = env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "6".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("RATE_LIMIT_WINDOW_SECS must be a valid number")?;

        let rate_limit_max_updates = env::var("RATE_LIMIT_MAX_UPDATES")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<u32>()
            .context("RATE_LIMIT_MAX_UPDATES must be a valid number")?;

        Ok(Config {
            bot_token,
            target_chat,
            topic_name,
            state_dir,
            sweep_interval,
            rate_limit_window,
            rate_limit_max_updates,
        })
    }
}
