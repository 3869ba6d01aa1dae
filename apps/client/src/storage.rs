//! Persistent key/value storage for the profile.
//!
//! Every profile field lives under its own key as one JSON value. There is
//! no transaction across keys; callers write all keys as one concurrent batch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;

pub const KEY_DECKS: &str = "decks";
pub const KEY_DECK_DATA: &str = "deckData";
pub const KEY_CONFIG: &str = "config";
pub const KEY_REVIEW_LOGS: &str = "reviewLogs";
pub const KEY_AUTO_REVIEW_GRADE_LOG: &str = "autoReviewGradeLog";
pub const KEY_META: &str = "meta";
pub const KEY_LAST_SYNC_TIME: &str = "lastSyncTime";
pub const KEY_LOGIN_STATUS: &str = "loginStatus";

type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_value(&self, key: &str) -> Result<Option<Value>>;
    async fn save_value(&self, key: &str, value: Value) -> Result<()>;
}

/// Load a typed value. Missing keys, failed reads and undecodable values all
/// come back as `None`.
pub async fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let value = match storage.load_value(key).await {
        Ok(value) => value?,
        Err(e) => {
            tracing::warn!("failed to load '{}': {}", key, e);
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("ignoring undecodable '{}': {}", key, e);
            None
        }
    }
}

pub async fn save<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    storage.save_value(key, serde_json::to_value(value)?).await
}

/// Volatile storage, used by tests and as a fallback when no store can be opened.
#[derive(Default)]
pub struct MemoryStorage {
    values: tokio::sync::RwLock<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_value` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn save_value(&self, key: &str, value: Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed storage with one row per key.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open database at path, creating it and its directory if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::initialize(Connection::open(path)?)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Task("connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn load_value(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StorageError::from))
            .transpose()
    }

    async fn save_value(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        let raw = serde_json::to_string(&value)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, raw],
            )?;
            Ok(())
        })
        .await
    }
}
