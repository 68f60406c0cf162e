//! In-memory key/value store (process lifetime only).

use async_trait::async_trait;
use dispatch_types::{KvStore, KvStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KvStoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KvStoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, KvStoreError> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_overwrite() {
        let kv = InMemoryKvStore::new();
        assert!(kv.get("a").await.unwrap().is_none());
        kv.set("a", json!([1, 2])).await.unwrap();
        kv.set("b", json!({"x": 1})).await.unwrap();
        kv.set("a", json!([3])).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(json!([3])));
        assert_eq!(kv.keys().await.unwrap(), vec!["a", "b"]);
    }
}
