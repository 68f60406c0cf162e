//! SQLite-backed key/value store. Values are stored as JSON text.

use async_trait::async_trait;
use dispatch_types::{KvStore, KvStoreError};
use rusqlite::OptionalExtension;
use std::path::Path;

pub struct SqliteKvStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteKvStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, KvStoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| KvStoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, KvStoreError> {
        let conn =
            rusqlite::Connection::open_in_memory().map_err(|e| KvStoreError::Other(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, KvStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| KvStoreError::Other(e.to_string()))?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, KvStoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| KvStoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| KvStoreError::Other(e.to_string()))
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KvStoreError> {
        let raw: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
        })?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KvStoreError> {
        let text = serde_json::to_string(&value)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, text, now],
            )
        })?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, KvStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }
}
