//! SQLite message log.
//!
//! One `messages` table keyed `(thread_id, seq)`; `seq` is assigned inside
//! the insert transaction, so a thread's entries read back in exactly the
//! order their appends committed. The connection is serialized behind a
//! mutex and every call runs on the blocking thread pool.

use super::{MessageStore, StoreError};
use crate::core::message::{Message, Role};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMessageStore {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory database, useful for tests and throwaway sessions.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // WAL keeps readers off the writer's back; synchronous=FULL makes a
        // committed append survive a crash right after `append` returns.
        // journal_mode reports the resulting mode as a row, so it goes
        // through query_row rather than execute.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                thread_id  TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                role       TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content    TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (thread_id, seq)
            );
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Arc<Mutex<Connection>>) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement on another thread;
        // the connection itself is still usable.
        conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, thread_id: &str, message: &Message) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let thread_id = thread_id.to_string();
        let message = message.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = Self::lock(&conn);
            let tx = conn.transaction()?;

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE thread_id = ?1",
                params![&thread_id],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO messages (thread_id, seq, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &thread_id,
                    seq,
                    message.role.as_str(),
                    &message.content,
                    unix_timestamp()
                ],
            )?;

            tx.commit()?;

            tracing::debug!(
                "[SqliteMessageStore] Appended message {} for thread '{}'",
                seq,
                thread_id
            );
            Ok(())
        })
        .await?
    }

    async fn read(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.clone();
        let thread_id = thread_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT role, content FROM messages WHERE thread_id = ?1 ORDER BY seq",
            )?;

            let rows = stmt.query_map(params![&thread_id], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                Ok((role, content))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row?;
                let role = Role::from_str(&role).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "unknown role '{}' in thread '{}'",
                        role, thread_id
                    ))
                })?;
                messages.push(Message { role, content });
            }

            tracing::debug!(
                "[SqliteMessageStore] Read {} messages for thread '{}'",
                messages.len(),
                thread_id
            );
            Ok(messages)
        })
        .await?
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare("SELECT DISTINCT thread_id FROM messages")?;

            let threads = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;

            tracing::debug!("[SqliteMessageStore] Listed {} threads", threads.len());
            Ok(threads)
        })
        .await?
    }
}
