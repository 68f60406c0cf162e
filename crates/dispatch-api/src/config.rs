//! Service configuration from the environment and store backend selection.

use dispatch_store::{InMemoryKvStore, JsonFileKvStore, KvStore, KvStoreError};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8002";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Memory,
    Json,
    Sqlite,
}

impl StoreBackend {
    /// Parse a `DISPATCH_STORE` value; unknown values are `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Some(StoreBackend::Memory),
            "json" => Some(StoreBackend::Json),
            "sqlite" => Some(StoreBackend::Sqlite),
            _ => None,
        }
    }

    pub fn default_path(self) -> &'static str {
        match self {
            StoreBackend::Memory => "",
            StoreBackend::Json => "dispatch-data.json",
            StoreBackend::Sqlite => "dispatch.db",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub listen: String,
    pub store: StoreBackend,
    pub data_path: PathBuf,
}

impl ServiceConfig {
    /// Reads `DISPATCH_LISTEN`, `DISPATCH_STORE` and `DISPATCH_DATA_PATH`.
    pub fn from_env() -> Self {
        let listen = std::env::var("DISPATCH_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
        let store = match std::env::var("DISPATCH_STORE") {
            Ok(raw) => StoreBackend::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown DISPATCH_STORE, using memory");
                StoreBackend::Memory
            }),
            Err(_) => StoreBackend::Memory,
        };
        let data_path = std::env::var("DISPATCH_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(store.default_path()));
        Self {
            listen,
            store,
            data_path,
        }
    }

    pub async fn open_kv_store(&self) -> Result<Arc<dyn KvStore>, KvStoreError> {
        match self.store {
            StoreBackend::Memory => Ok(Arc::new(InMemoryKvStore::new())),
            StoreBackend::Json => Ok(Arc::new(JsonFileKvStore::open(&self.data_path).await?)),
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite => Ok(Arc::new(dispatch_store::SqliteKvStore::new(
                &self.data_path,
            )?)),
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite => Err(KvStoreError::Other(
                "sqlite backend requires the `sqlite` feature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!(StoreBackend::parse("JSON"), Some(StoreBackend::Json));
        assert_eq!(StoreBackend::parse(" sqlite "), Some(StoreBackend::Sqlite));
        assert_eq!(StoreBackend::parse(""), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::parse("redis"), None);
    }

    #[tokio::test]
    async fn json_backend_opens_at_data_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            listen: DEFAULT_LISTEN.to_string(),
            store: StoreBackend::Json,
            data_path: dir.path().join("data.json"),
        };
        let kv = config.open_kv_store().await.unwrap();
        kv.set("users", serde_json::json!([])).await.unwrap();
        assert!(dir.path().join("data.json").exists());
    }
}
