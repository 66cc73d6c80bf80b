//! Key-value storage for decryption authorizations.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use fhe_counter_lib::{AuthorizationKey, DecryptionAuthorization};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait SignatureStorage: Send + Sync {
    async fn get(&self, key: &AuthorizationKey) -> Result<Option<DecryptionAuthorization>>;

    /// Replace whatever is stored under `key`.
    async fn set(&self, key: &AuthorizationKey, authorization: DecryptionAuthorization) -> Result<()>;
}

/// Process-local storage; authorizations are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<AuthorizationKey, DecryptionAuthorization>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SignatureStorage for InMemoryStorage {
    async fn get(&self, key: &AuthorizationKey) -> Result<Option<DecryptionAuthorization>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &AuthorizationKey, authorization: DecryptionAuthorization) -> Result<()> {
        self.entries.write().await.insert(*key, authorization);
        Ok(())
    }
}

/// Storage persisted as a JSON array in a single file, so a CLI user signs
/// once across runs.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<AuthorizationKey, DecryptionAuthorization>>,
}

impl JsonFileStorage {
    /// Open the store at `path`; a missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => {
                let stored: Vec<DecryptionAuthorization> = serde_json::from_str(&contents)?;
                stored.into_iter().map(|auth| (auth.key(), auth)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} decryption authorizations from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<AuthorizationKey, DecryptionAuthorization>) -> Result<()> {
        let mut stored: Vec<&DecryptionAuthorization> = entries.values().collect();
        stored.sort_by_key(|auth| auth.key());
        let contents = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ClientError::Storage(format!("failed to replace {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl SignatureStorage for JsonFileStorage {
    async fn get(&self, key: &AuthorizationKey) -> Result<Option<DecryptionAuthorization>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &AuthorizationKey, authorization: DecryptionAuthorization) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(*key, authorization);
        self.persist(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};

    fn authorization(owner: u8, contract: u8, issued_at: u64) -> DecryptionAuthorization {
        DecryptionAuthorization {
            owner_address: Address::repeat_byte(owner),
            contract_address: Address::repeat_byte(contract),
            public_key: Bytes::from(vec![owner]),
            private_key: Bytes::from(vec![contract]),
            signature: Bytes::from(vec![7; 65]),
            issued_at,
            valid_duration_seconds: 3600,
        }
    }

    #[tokio::test]
    async fn test_in_memory_last_write_wins() {
        let storage = InMemoryStorage::new();
        let first = authorization(1, 2, 10);
        let second = authorization(1, 2, 20);
        let key = first.key();

        assert_eq!(storage.get(&key).await.unwrap(), None);
        storage.set(&key, first).await.unwrap();
        storage.set(&key, second.clone()).await.unwrap();

        assert_eq!(storage.get(&key).await.unwrap(), Some(second));
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_json_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("signatures.json");

        let a = authorization(1, 2, 10);
        let b = authorization(3, 2, 10);
        {
            let storage = JsonFileStorage::open(&path).await.unwrap();
            storage.set(&a.key(), a.clone()).await.unwrap();
            storage.set(&b.key(), b.clone()).await.unwrap();
        }

        let reopened = JsonFileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get(&a.key()).await.unwrap(), Some(a));
        assert_eq!(reopened.get(&b.key()).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = JsonFileStorage::open(&path).await;
        assert!(matches!(result, Err(ClientError::Serialization(_))));
    }
}
