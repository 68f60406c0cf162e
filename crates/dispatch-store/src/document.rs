//! Typed load/save of whole JSON documents.

use dispatch_types::{KvStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load `key`, or `T::default()` when the key is absent or null.
pub(crate) async fn load<T>(kv: &dyn KvStore, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match kv.get(key).await? {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        }),
    }
}

pub(crate) async fn save<T>(kv: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let v = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })?;
    kv.set(key, v).await?;
    Ok(())
}
