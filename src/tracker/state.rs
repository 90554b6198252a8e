//! State types for the message lifecycle tracker.
//!
//! A tracked message is an open obligation: a row exists if and only if the
//! message is still awaiting a reaction. The escalation state of a row is
//! never stored; it is derived at sweep time from the posting timestamp and
//! the number of reminder tiers already delivered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Newtype for a Telegram chat id to prevent mixing with other integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a message id within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a Telegram user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Number of whole days reminders keep escalating before tracking is
/// abandoned. A row older than this many days is expired on the next sweep.
pub const REMINDER_WINDOW_DAYS: i64 = 7;

pub const SECS_PER_DAY: i64 = 86_400;
pub const SECS_PER_HOUR: i64 = 3_600;

/// A message awaiting a reaction.
///
/// Identity is the `(chat_id, message_id)` pair; no two rows may share it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// The message sender. Informational only; never used for routing.
    pub author_id: UserId,
    /// Unix seconds at which the message was posted.
    pub posted_at: i64,
    /// Number of reminder tiers already delivered. Starts at 0 and only
    /// ever increases, up to the day count at the time of the last sweep.
    pub escalations_sent: u32,
}

/// Per-row state derived at sweep time.
///
/// `ReminderDue` carries the tier (whole days elapsed) the row has reached.
/// When more than one day passed since the last sweep (for example because
/// the process was down), the row jumps straight to the current tier rather
/// than replaying intermediate ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Posted less than a day ago; nothing to do.
    Fresh,
    /// A new reminder tier has been crossed since the last sweep.
    ReminderDue { tier: u32 },
    /// Inside the window but already reminded for the current tier.
    ReminderCurrent,
    /// Past the retention window; terminal.
    Expired,
}

/// Classify a tracked message at `now` (unix seconds).
///
/// Pure and deterministic; the sweeper applies the resulting policy.
pub fn classify(posted_at: i64, escalations_sent: u32, now: i64) -> EscalationState {
    let days_elapsed = (now - posted_at).max(0) / SECS_PER_DAY;
    if days_elapsed == 0 {
        EscalationState::Fresh
    } else if days_elapsed > REMINDER_WINDOW_DAYS {
        EscalationState::Expired
    } else if days_elapsed > i64::from(escalations_sent) {
        EscalationState::ReminderDue {
            tier: days_elapsed as u32,
        }
    } else {
        EscalationState::ReminderCurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fresh_until_a_full_day_has_passed() {
        assert_eq!(classify(1_000, 0, 1_000), EscalationState::Fresh);
        assert_eq!(
            classify(1_000, 0, 1_000 + SECS_PER_DAY - 1),
            EscalationState::Fresh
        );
    }

    #[test]
    fn first_tier_due_at_one_day() {
        assert_eq!(
            classify(1_000, 0, 1_000 + SECS_PER_DAY),
            EscalationState::ReminderDue { tier: 1 }
        );
    }

    #[test]
    fn current_tier_already_reminded_is_not_due() {
        assert_eq!(
            classify(1_000, 1, 1_000 + SECS_PER_DAY),
            EscalationState::ReminderCurrent
        );
    }

    #[test]
    fn skipped_days_jump_to_the_current_tier() {
        // Three days elapsed, nothing sent yet: the row is due exactly at
        // tier 3, not at tiers 1 and 2 first.
        assert_eq!(
            classify(1_000, 0, 1_000 + 3 * SECS_PER_DAY),
            EscalationState::ReminderDue { tier: 3 }
        );
    }

    #[test]
    fn last_tier_is_day_seven() {
        let posted = 1_000;
        assert_eq!(
            classify(posted, 6, posted + 7 * SECS_PER_DAY),
            EscalationState::ReminderDue { tier: 7 }
        );
        assert_eq!(
            classify(posted, 7, posted + 7 * SECS_PER_DAY),
            EscalationState::ReminderCurrent
        );
    }

    #[test]
    fn expired_strictly_after_the_window() {
        let posted = 1_000;
        // Day 7 (even its last second) is still inside the window.
        assert_ne!(
            classify(posted, 7, posted + 8 * SECS_PER_DAY - 1),
            EscalationState::Expired
        );
        assert_eq!(
            classify(posted, 7, posted + 8 * SECS_PER_DAY),
            EscalationState::Expired
        );
    }

    #[test]
    fn clock_skew_before_posting_counts_as_fresh() {
        assert_eq!(classify(1_000, 0, 500), EscalationState::Fresh);
    }

    proptest! {
        /// A due tier is always within the window, strictly above the
        /// progress counter, and equal to the whole days elapsed.
        #[test]
        fn due_tier_matches_days_elapsed(
            posted_at in 0i64..2_000_000_000,
            escalations_sent in 0u32..16,
            elapsed in 0i64..(20 * SECS_PER_DAY),
        ) {
            let now = posted_at + elapsed;
            if let EscalationState::ReminderDue { tier } =
                classify(posted_at, escalations_sent, now)
            {
                let days = elapsed / SECS_PER_DAY;
                prop_assert_eq!(i64::from(tier), days);
                prop_assert!(i64::from(tier) > i64::from(escalations_sent));
                prop_assert!((1..=REMINDER_WINDOW_DAYS).contains(&i64::from(tier)));
            }
        }

        /// Recording a due tier makes the row current: the same instant never
        /// produces a second reminder, so `escalations_sent` is non-decreasing
        /// and never exceeds the day count at sweep time.
        #[test]
        fn recording_the_tier_quiesces_the_row(
            posted_at in 0i64..2_000_000_000,
            escalations_sent in 0u32..16,
            elapsed in 0i64..(20 * SECS_PER_DAY),
        ) {
            let now = posted_at + elapsed;
            if let EscalationState::ReminderDue { tier } =
                classify(posted_at, escalations_sent, now)
            {
                prop_assert_eq!(
                    classify(posted_at, tier, now),
                    EscalationState::ReminderCurrent
                );
            }
        }
    }
}
