//! Escalation sweeper: the periodic policy pass over all tracked messages.
//!
//! Each sweep is a full scan of the store. Every row is classified by the
//! pure state machine in `state::classify` and the resulting action is
//! applied through the `Notifier`. Failures are isolated per row: nothing a
//! single row does may abort the sweep or crash the process.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::notifier::{Notifier, NotifyError};
use super::repository::{MessageRepository, StoreError};
use super::state::{classify, EscalationState, TrackedMessage, SECS_PER_HOUR};

/// Counters from one sweep pass, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub reminders_sent: usize,
    pub expired: usize,
    /// Rows dropped because their reply target no longer exists.
    pub purged: usize,
}

impl SweepStats {
    fn is_quiet(&self) -> bool {
        self.reminders_sent == 0 && self.expired == 0 && self.purged == 0
    }
}

fn reminder_text(hours_elapsed: i64) -> String {
    format!("A reaction is still needed on this message! ({hours_elapsed}h elapsed)")
}

fn expiry_text() -> String {
    "7 days have passed without a reaction; reminders for this message are now disabled."
        .to_string()
}

/// Run one sweep over the whole store at `now` (unix seconds).
pub async fn sweep(
    repo: &dyn MessageRepository,
    notifier: &dyn Notifier,
    now: i64,
) -> SweepStats {
    let mut stats = SweepStats::default();

    let rows = match repo.all().await {
        Ok(rows) => rows,
        Err(e) => {
            error!("sweep aborted, could not scan store: {e}");
            return stats;
        }
    };

    for row in rows {
        stats.scanned += 1;
        if let Err(e) = sweep_row(repo, notifier, &row, now, &mut stats).await {
            // Row isolation: log and move on to the next row.
            error!(
                chat_id = %row.chat_id,
                message_id = %row.message_id,
                "sweep failed for row: {e}"
            );
        }
    }

    if stats.is_quiet() {
        debug!(scanned = stats.scanned, "sweep complete, nothing due");
    } else {
        info!(
            scanned = stats.scanned,
            reminders_sent = stats.reminders_sent,
            expired = stats.expired,
            purged = stats.purged,
            "sweep complete"
        );
    }
    stats
}

async fn sweep_row(
    repo: &dyn MessageRepository,
    notifier: &dyn Notifier,
    row: &TrackedMessage,
    now: i64,
    stats: &mut SweepStats,
) -> Result<(), StoreError> {
    match classify(row.posted_at, row.escalations_sent, now) {
        EscalationState::Fresh | EscalationState::ReminderCurrent => Ok(()),

        EscalationState::ReminderDue { tier } => {
            let hours_elapsed = (now - row.posted_at).max(0) / SECS_PER_HOUR;
            let send = notifier
                .send_message(row.chat_id, &reminder_text(hours_elapsed), Some(row.message_id))
                .await;

            match send {
                Ok(sent) if sent.reply_linkage_intact => {
                    repo.update_progress(row.chat_id, row.message_id, tier)
                        .await?;
                    stats.reminders_sent += 1;
                    Ok(())
                }
                Ok(sent) => {
                    // Delivered, but the tracked message is gone: drop the
                    // row and clean up the now-orphaned reminder.
                    warn!(
                        chat_id = %row.chat_id,
                        message_id = %row.message_id,
                        "reply linkage lost, dropping tracked message"
                    );
                    repo.delete(row.chat_id, row.message_id).await?;
                    stats.purged += 1;
                    if let Err(e) = notifier.delete_message(row.chat_id, sent.message_id).await {
                        debug!(
                            chat_id = %row.chat_id,
                            reminder_id = %sent.message_id,
                            "could not remove orphaned reminder: {e}"
                        );
                    }
                    Ok(())
                }
                Err(NotifyError::BrokenLinkage(reason)) => {
                    warn!(
                        chat_id = %row.chat_id,
                        message_id = %row.message_id,
                        "reply target gone, dropping tracked message: {reason}"
                    );
                    repo.delete(row.chat_id, row.message_id).await?;
                    stats.purged += 1;
                    Ok(())
                }
                Err(NotifyError::Transport(reason)) => {
                    // Transient: keep the row untouched. escalations_sent is
                    // unchanged, so the same tier is due again next sweep.
                    warn!(
                        chat_id = %row.chat_id,
                        message_id = %row.message_id,
                        "reminder send failed, will retry next sweep: {reason}"
                    );
                    Ok(())
                }
            }
        }

        EscalationState::Expired => {
            // Only the caller that actually removed the row announces the
            // expiry; a concurrent resolver may have won the delete.
            if repo.delete(row.chat_id, row.message_id).await? {
                stats.expired += 1;
                if let Err(e) = notifier
                    .send_message(row.chat_id, &expiry_text(), None)
                    .await
                {
                    warn!(chat_id = %row.chat_id, "terminal notification failed: {e}");
                }
            }
            Ok(())
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Periodic sweep driver. Runs until the shutdown flag flips; a sweep in
/// progress finishes its current row before the loop exits on the next tick.
pub async fn sweep_loop(
    repo: Arc<dyn MessageRepository>,
    notifier: Arc<dyn Notifier>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    info!(period_secs = period.as_secs(), "sweep loop started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(repo.as_ref(), notifier.as_ref(), unix_now()).await;
            }
            _ = shutdown.changed() => {
                info!("sweep loop stopping");
                return;
            }
        }
    }
}
