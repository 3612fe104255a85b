use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{errors::Error, Result};

/// Key/value persistence port.
///
/// Every piece of state that must survive between two invocations (pending
/// OAuth connections, linked accounts, preferences) goes through here.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read and remove in one step. Implementations should make this atomic so
    /// that a value can only ever be taken once.
    async fn take(&self, key: &str) -> Result<Option<Value>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }
}

pub async fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.lock().await.remove(key))
    }
}

/// KV store persisted as a single JSON object on disk.
///
/// The whole map is rewritten on every mutation; fine for the handful of keys
/// per user this bridge keeps.
pub struct JsonFileKvStore {
    path: PathBuf,
    inner: Mutex<Map<String, Value>>,
}

impl JsonFileKvStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.is_dir() {
            return Err(Error::InvalidPath {
                path,
                reason: "store file is a directory".to_string(),
            });
        }

        let map = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::Store(format!(
                        "{} does not contain a JSON object",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.inner.lock().await;
        let mut next = map.clone();
        next.insert(key.to_string(), value);
        self.flush(&next).await?;
        *map = next;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.take(key).await.map(|_| ())
    }

    async fn take(&self, key: &str) -> Result<Option<Value>> {
        let mut map = self.inner.lock().await;
        if !map.contains_key(key) {
            return Ok(None);
        }
        let mut next = map.clone();
        let value = next.remove(key);
        self.flush(&next).await?;
        *map = next;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    #[tokio::test]
    async fn memory_take_removes_value() {
        let store = MemoryKvStore::new();
        store.set("k", json!("v")).await.unwrap();
        assert_eq!(store.take("k").await.unwrap(), Some(json!("v")));
        assert_eq!(store.take("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = tmp_file("zcb-store-test");
        {
            let store = JsonFileKvStore::open(&path).await.unwrap();
            store.set("a", json!({"x": 1})).await.unwrap();
            store.set("b", json!("gone")).await.unwrap();
            store.delete("b").await.unwrap();
        }

        let reopened = JsonFileKvStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(reopened.get("b").await.unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_flush_leaves_memory_unchanged() {
        let path = tmp_file("zcb-store-flush");
        let store = JsonFileKvStore::open(&path).await.unwrap();
        store.set("pending", json!(true)).await.unwrap();

        // Writes to a directory fail.
        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir(store.path()).unwrap();

        assert!(store.take("pending").await.is_err());
        assert_eq!(store.get("pending").await.unwrap(), Some(json!(true)));
        assert!(store.delete("pending").await.is_err());
        assert_eq!(store.get("pending").await.unwrap(), Some(json!(true)));
        assert!(store.set("other", json!(1)).await.is_err());
        assert_eq!(store.get("other").await.unwrap(), None);

        let _ = std::fs::remove_dir(&path);
    }

    #[tokio::test]
    async fn file_store_rejects_non_object_file() {
        let path = tmp_file("zcb-store-bad");
        std::fs::write(&path, "[1,2,3]").unwrap();
        assert!(JsonFileKvStore::open(&path).await.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn typed_helpers_round_trip_through_json() {
        let store = MemoryKvStore::new();
        save(&store, "nums", &vec![1u32, 2, 3]).await.unwrap();
        let loaded: Option<Vec<u32>> = load(&store, "nums").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        let missing: Option<Vec<u32>> = load(&store, "other").await.unwrap();
        assert_eq!(missing, None);
    }
}
