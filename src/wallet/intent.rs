//! Persisted "disconnect intent" flag.
//!
//! Set when the user explicitly logs out so the next start does not
//! silently reconnect to an already-authorized wallet. Cleared by any
//! successful connect, account switch, or non-empty accounts change.

use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::{KeyValueStore, MemoryStore};

/// Storage key of the flag.
pub const DISCONNECT_FLAG_KEY: &str = "arbiter_session_disconnected";
const FLAG_SET_VALUE: &str = "true";

#[derive(Clone)]
pub struct DisconnectIntent {
    store: Arc<dyn KeyValueStore>,
}

impl DisconnectIntent {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Flag backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Whether the user explicitly disconnected. Unreadable storage counts
    /// as "not set".
    pub async fn is_set(&self) -> bool {
        match self.store.get(DISCONNECT_FLAG_KEY).await {
            Ok(value) => value.as_deref() == Some(FLAG_SET_VALUE),
            Err(e) => {
                tracing::warn!("Failed to read disconnect flag, assuming unset: {}", e);
                false
            }
        }
    }

    pub async fn set(&self) -> Result<(), StorageError> {
        self.store.set(DISCONNECT_FLAG_KEY, FLAG_SET_VALUE).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(DISCONNECT_FLAG_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_flag_lifecycle() {
        let intent = DisconnectIntent::in_memory();
        assert!(!intent.is_set().await);

        intent.set().await.unwrap();
        intent.set().await.unwrap();
        assert!(intent.is_set().await);

        intent.clear().await.unwrap();
        assert!(!intent.is_set().await);
    }

    #[tokio::test]
    async fn test_flag_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        DisconnectIntent::new(Arc::new(FileStore::new(&path)))
            .set()
            .await
            .unwrap();

        let reopened = DisconnectIntent::new(Arc::new(FileStore::new(&path)));
        assert!(reopened.is_set().await);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[DISCONNECT_FLAG_KEY], "true");
    }

    #[tokio::test]
    async fn test_only_literal_true_counts() {
        let store = Arc::new(MemoryStore::new());
        store.set(DISCONNECT_FLAG_KEY, "yes").await.unwrap();
        assert!(!DisconnectIntent::new(store).is_set().await);
    }

    #[tokio::test]
    async fn test_corrupt_storage_reads_as_unset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "][").unwrap();

        let intent = DisconnectIntent::new(Arc::new(FileStore::new(&path)));
        assert!(!intent.is_set().await);
    }

    #[tokio::test]
    async fn test_flag_can_be_set_over_corrupt_storage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "][").unwrap();

        let intent = DisconnectIntent::new(Arc::new(FileStore::new(&path)));
        intent.set().await.unwrap();
        assert!(intent.is_set().await);

        let reopened = DisconnectIntent::new(Arc::new(FileStore::new(&path)));
        assert!(reopened.is_set().await);
    }
}
