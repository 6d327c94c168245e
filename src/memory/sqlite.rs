//! SQLite-backed thread store with migrations

use super::{ConversationThread, Message, Role, StoreError, ThreadStore};
use crate::error::{AssistError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: threads and their messages
    r#"
    CREATE TABLE threads (
        thread_id TEXT PRIMARY KEY,
        summary TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        thread_id TEXT NOT NULL REFERENCES threads(thread_id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (thread_id, position)
    );

    CREATE INDEX idx_messages_thread ON messages(thread_id, position);
    "#,
];

/// Thread store in a single SQLite file
pub struct SqliteThreadStore {
    pool: DbPool,
}

impl SqliteThreadStore {
    /// Open (or create) the database at `db_path` and apply pending migrations
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AssistError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| AssistError::MemoryStoreUnavailable(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.migrate()?;

        tracing::info!("Conversation store opened at {}", db_path.display());
        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        get_conn(&self.pool)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Number of stored threads
    pub fn thread_count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Ids of the most recently updated threads
    pub fn recent_threads(&self, limit: usize) -> Result<Vec<(String, DateTime<Utc>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, updated_at FROM threads ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut threads = Vec::new();
        for row in rows {
            let (id, updated_at) = row?;
            threads.push((id, parse_timestamp(&updated_at)?));
        }
        Ok(threads)
    }
}

fn get_conn(pool: &DbPool) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
    pool.get()
        .map_err(|e| AssistError::MemoryStoreUnavailable(format!("Failed to get connection: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AssistError::MemoryStoreUnavailable(format!("Bad timestamp '{}': {}", value, e)))
}

/// Read header and messages from one snapshot, so a concurrent `put` is seen whole or not at all
fn load_thread(pool: &DbPool, thread_id: &str) -> Result<Option<ConversationThread>> {
    let mut conn = get_conn(pool)?;
    let tx = conn.transaction()?;

    let header: Option<(Option<String>, String)> = tx
        .query_row(
            "SELECT summary, updated_at FROM threads WHERE thread_id = ?1",
            params![thread_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((summary, updated_at)) = header else {
        return Ok(None);
    };

    let rows: Vec<(String, String, String)> = {
        let mut stmt = tx.prepare(
            "SELECT role, content, created_at FROM messages WHERE thread_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        collected
    };
    tx.commit()?;

    let mut messages = Vec::with_capacity(rows.len());
    for (role, content, created_at) in rows {
        let role = Role::parse(&role).ok_or_else(|| {
            AssistError::MemoryStoreUnavailable(format!("Unknown role '{}' in thread {}", role, thread_id))
        })?;
        messages.push(Message {
            role,
            content,
            timestamp: parse_timestamp(&created_at)?,
        });
    }

    Ok(Some(ConversationThread {
        thread_id: thread_id.to_string(),
        messages,
        summary,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}

/// Replace the stored thread inside one transaction
fn save_thread(pool: &DbPool, thread: &ConversationThread) -> Result<()> {
    let mut conn = get_conn(pool)?;
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO threads (thread_id, summary, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(thread_id) DO UPDATE SET summary = excluded.summary, updated_at = excluded.updated_at",
        params![thread.thread_id, thread.summary, thread.updated_at.to_rfc3339()],
    )?;
    tx.execute(
        "DELETE FROM messages WHERE thread_id = ?1",
        params![thread.thread_id],
    )?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO messages (thread_id, position, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, message) in thread.messages.iter().enumerate() {
            insert.execute(params![
                thread.thread_id,
                position as i64,
                message.role.as_str(),
                message.content,
                message.timestamp.to_rfc3339(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn get(&self, thread_id: &str) -> std::result::Result<Option<ConversationThread>, StoreError> {
        let pool = self.pool.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || load_thread(&pool, &thread_id))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn put(&self, thread: &ConversationThread) -> std::result::Result<(), StoreError> {
        let pool = self.pool.clone();
        let thread = thread.clone();
        tokio::task::spawn_blocking(move || save_thread(&pool, &thread))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteThreadStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteThreadStore::open(&temp.path().join("threads.sqlite")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_migrations() {
        let (_temp, store) = open();
        let conn = store.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("threads.sqlite");
        drop(SqliteThreadStore::open(&path).unwrap());
        let store = SqliteThreadStore::open(&path).unwrap();
        assert_eq!(store.thread_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_order_and_summary() {
        let (_temp, store) = open();

        let mut thread = ConversationThread::new("abc");
        thread.summary = Some("Khách hỏi về iPhone 15".to_string());
        thread.messages.push(Message::user("Còn màu xanh không?"));
        thread.messages.push(Message::assistant("Dạ còn ạ."));
        store.put(&thread).await.unwrap();

        let loaded = store.get("abc").await.unwrap().unwrap();
        assert_eq!(loaded.summary, thread.summary);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, Role::User);
        assert_eq!(loaded.messages[1].content, "Dạ còn ạ.");

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_reader_never_sees_half_a_put() {
        let (_temp, store) = open();

        let mut long = ConversationThread::new("t");
        for i in 0..6 {
            long.messages.push(Message::user(format!("m{}", i)));
        }
        let mut short = long.clone();
        short.messages.drain(..4);
        short.summary = Some("tóm tắt".to_string());

        save_thread(&store.pool, &long).unwrap();

        let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let writer = {
            let pool = store.pool.clone();
            let done = std::sync::Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 0..300 {
                    let thread = if i % 2 == 0 { &short } else { &long };
                    save_thread(&pool, thread).unwrap();
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            })
        };

        let mut reads = 0;
        while !done.load(std::sync::atomic::Ordering::SeqCst) || reads == 0 {
            let loaded = load_thread(&store.pool, "t").unwrap().unwrap();
            match (&loaded.summary, loaded.messages.len()) {
                (Some(_), 2) | (None, 6) => {}
                (summary, len) => panic!("mixed thread: summary={:?} messages={}", summary, len),
            }
            reads += 1;
        }

        writer.join().unwrap();
        assert!(reads > 0);
    }

    #[tokio::test]
    async fn test_put_replaces_messages() {
        let (_temp, store) = open();

        let mut thread = ConversationThread::new("t");
        for i in 0..6 {
            thread.messages.push(Message::user(format!("m{}", i)));
        }
        store.put(&thread).await.unwrap();

        thread.messages.drain(..4);
        thread.summary = Some("tóm tắt".to_string());
        store.put(&thread).await.unwrap();

        let loaded = store.get("t").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "m4");
        assert_eq!(store.thread_count().unwrap(), 1);
        assert_eq!(store.recent_threads(10).unwrap()[0].0, "t");
    }
}
