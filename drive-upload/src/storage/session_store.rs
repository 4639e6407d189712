use super::kv_store::{KvStore, StoreError};
use crate::upload::session::UploadSession;

pub const SESSION_KEY: &str = "upload_session";

/// Single-slot store for the resumable upload session.
#[derive(Clone)]
pub struct SessionStore {
    kv: KvStore,
}

impl SessionStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub fn memory() -> Self {
        Self::new(KvStore::memory())
    }

    pub fn is_durable(&self) -> bool {
        self.kv.is_durable()
    }

    pub async fn load(&self) -> Result<Option<UploadSession>, StoreError> {
        match self.kv.get(SESSION_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, session: &UploadSession) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)?;
        self.kv.set(SESSION_KEY, &raw).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.kv.remove(SESSION_KEY).await
    }

    /// Clears the slot only while it still holds session `id`. Returns whether
    /// anything was removed.
    pub async fn clear_if(&self, id: &str) -> Result<bool, StoreError> {
        let stored = match self.load().await {
            Ok(stored) => stored,
            Err(StoreError::Serde(_)) => None,
            Err(err) => return Err(err),
        };
        match stored {
            Some(session) if session.id == id => {
                self.clear().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
