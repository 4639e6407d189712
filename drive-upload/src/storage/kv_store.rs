use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;
use time::OffsetDateTime;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable string slots keyed by name. Last write wins; there is no
/// transactional guarantee across keys.
#[derive(Clone)]
pub struct KvStore {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Sqlite(SqlitePool),
    Memory(Arc<Mutex<HashMap<String, String>>>),
}

impl KvStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            backend: Backend::Sqlite(pool),
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::default()),
        }
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.init().await?;
        Ok(store)
    }

    /// Falls back to a process-local map when the database cannot be opened,
    /// which keeps uploads working but makes them non-resumable.
    pub async fn open_or_memory(db_path: &Path) -> Self {
        match Self::open(db_path).await {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(
                    path = %db_path.display(),
                    "durable store unavailable, uploads will not be resumable: {err}"
                );
                Self::memory()
            }
        }
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        if let Backend::Sqlite(pool) = &self.backend {
            MIGRATOR.run(pool).await?;
        }
        Ok(())
    }

    pub fn is_durable(&self) -> bool {
        matches!(self.backend, Backend::Sqlite(_))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.backend {
            Backend::Sqlite(pool) => {
                let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
                    .bind(key)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(|row| row.get::<String, _>("value")))
            }
            Backend::Memory(map) => Ok(lock(map).get(key).cloned()),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Sqlite(pool) => {
                sqlx::query(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value,
                         updated_at = excluded.updated_at",
                )
                .bind(key)
                .bind(value)
                .bind(OffsetDateTime::now_utc().unix_timestamp())
                .execute(pool)
                .await?;
            }
            Backend::Memory(map) => {
                lock(map).insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Sqlite(pool) => {
                sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                    .bind(key)
                    .execute(pool)
                    .await?;
            }
            Backend::Memory(map) => {
                lock(map).remove(key);
            }
        }
        Ok(())
    }
}

fn lock(map: &Mutex<HashMap<String, String>>) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
