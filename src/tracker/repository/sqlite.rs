//! SQLite implementation of `MessageRepository`.
//!
//! Persistent storage that survives service restarts. The schema mirrors the
//! store contract: one `messages` table keyed by `(chat_id, message_id)`.
//!
//! # Schema versioning
//!
//! A `schema_version` table tracks the schema version. When the schema needs
//! to change, increment `CURRENT_SCHEMA_VERSION` and add a migration in
//! `run_migrations()`. Migrations run sequentially from the current version
//! to the target version.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{MessageRepository, StoreError};
use crate::tracker::state::{ChatId, MessageId, TrackedMessage, UserId};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed message repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime. The single shared connection
/// serializes all row operations, which gives the per-key atomicity the
/// store contract requires.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist, and runs
    /// any pending migrations otherwise. The database is configured with
    /// WAL journaling, `synchronous = FULL` and a 5s busy timeout.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| StoreError::storage("open database", e.to_string()))?;

        // WAL can silently stay off on filesystems without shared-memory
        // support; in-memory databases report "memory", which is fine.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(StoreError::storage(
                "configure journal_mode",
                format!(
                    "failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| StoreError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::storage(
                "schema version",
                format!(
                    "database schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    from_id INTEGER NOT NULL,
                    date INTEGER NOT NULL,
                    notifications_sent INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (chat_id, message_id)
                );
                "#,
            )
            .map_err(|e| StoreError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::storage("update schema version", e.to_string()))?;

        Ok(())
    }
}

/// Convert a `notifications_sent` column value to the in-memory counter.
///
/// A negative value indicates database corruption or a bug in previous code.
fn column_to_progress(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::corruption(format!("negative notifications_sent {}", value)))
}

#[async_trait]
impl MessageRepository for SqliteRepository {
    async fn insert(&self, message: &TrackedMessage) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let row = message.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            // DO NOTHING keeps the existing row and its escalation progress.
            conn.execute(
                "INSERT INTO messages (chat_id, message_id, from_id, date, notifications_sent)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chat_id, message_id) DO NOTHING",
                params![
                    row.chat_id.0,
                    row.message_id.0,
                    row.author_id.0,
                    row.posted_at,
                    i64::from(row.escalations_sent)
                ],
            )
            .map_err(|e| StoreError::storage("insert", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::storage("insert", e.to_string()))?
    }

    async fn find_and_delete(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<TrackedMessage>, StoreError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            // DELETE...RETURNING atomically removes and returns the row.
            let result: Option<(i64, i64, i64)> = conn
                .query_row(
                    "DELETE FROM messages WHERE chat_id = ?1 AND message_id = ?2
                     RETURNING from_id, date, notifications_sent",
                    params![chat_id.0, message_id.0],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(|e| StoreError::storage("find_and_delete", e.to_string()))?;

            match result {
                Some((from_id, date, sent)) => Ok(Some(TrackedMessage {
                    chat_id,
                    message_id,
                    author_id: UserId(from_id),
                    posted_at: date,
                    escalations_sent: column_to_progress(sent)?,
                })),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::storage("find_and_delete", e.to_string()))?
    }

    async fn all(&self) -> Result<Vec<TrackedMessage>, StoreError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            let mut stmt = conn
                .prepare(
                    "SELECT chat_id, message_id, from_id, date, notifications_sent
                     FROM messages ORDER BY date, chat_id, message_id",
                )
                .map_err(|e| StoreError::storage("all", e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|e| StoreError::storage("all", e.to_string()))?;

            let mut results = Vec::new();
            for row in rows {
                let (chat_id, message_id, from_id, date, sent) = match row {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("skipping unreadable row in messages table: {}", e);
                        continue;
                    }
                };

                // Skip corrupt rows so the sweep can still process the rest.
                let escalations_sent = match column_to_progress(sent) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(chat_id, message_id, "skipping corrupt row: {}", e);
                        continue;
                    }
                };

                results.push(TrackedMessage {
                    chat_id: ChatId(chat_id),
                    message_id: MessageId(message_id),
                    author_id: UserId(from_id),
                    posted_at: date,
                    escalations_sent,
                });
            }

            Ok(results)
        })
        .await
        .map_err(|e| StoreError::storage("all", e.to_string()))?
    }

    async fn update_progress(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        escalations_sent: u32,
    ) -> Result<(), StoreError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE messages SET notifications_sent = ?3
                 WHERE chat_id = ?1 AND message_id = ?2",
                params![chat_id.0, message_id.0, i64::from(escalations_sent)],
            )
            .map_err(|e| StoreError::storage("update_progress", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::storage("update_progress", e.to_string()))?
    }

    async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<bool, StoreError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let removed = conn
                .execute(
                    "DELETE FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                    params![chat_id.0, message_id.0],
                )
                .map_err(|e| StoreError::storage("delete", e.to_string()))?;
            Ok(removed > 0)
        })
        .await
        .map_err(|e| StoreError::storage("delete", e.to_string()))?
    }
}
