//! JSON-file key/value store: the whole map is one document, rewritten on every set.

use async_trait::async_trait;
use dispatch_types::{KvStore, KvStoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct JsonFileKvStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileKvStore {
    /// Open the store at `path`; a missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, KvStoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened json kv store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, serde_json::Value>) -> Result<(), KvStoreError> {
        let body = serde_json::to_vec_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KvStoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KvStoreError> {
        // Held across persist so concurrent sets never write a stale snapshot.
        let mut guard = self.entries.write().await;
        let previous = guard.insert(key.to_string(), value);
        if let Err(e) = self.persist(&guard).await {
            match previous {
                Some(v) => guard.insert(key.to_string(), v),
                None => guard.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, KvStoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
