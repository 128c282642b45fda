//! Key-value storage collaborator.
//!
//! The core keeps all durable state in one opaque store offering `get`,
//! `set` (merge) and `remove`. Two backends are provided: an in-memory map
//! and a JSON document on disk that is replaced atomically on every write.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::StorageError;

pub const VAULT_KEY: &str = "vault";
pub const SESSION_KEY: &str = "session";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored values for `keys`; missing keys are left out.
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError>;

    /// Merges `record` into the store and returns the stored values of the
    /// written keys.
    async fn set(&self, record: Map<String, Value>) -> Result<Map<String, Value>, StorageError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError>;
}

pub async fn read_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let mut found = store.get(&[key]).await?;
    match found.remove(key) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            }),
    }
}

pub async fn write_record<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let mut record = Map::new();
    record.insert(key.to_string(), serde_json::to_value(value)?);
    store.set(record).await?;
    Ok(())
}

fn pick(source: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| source.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn merge(target: &mut Map<String, Value>, record: Map<String, Value>) -> Map<String, Value> {
    let mut written = Map::new();
    for (key, value) in record {
        target.insert(key.clone(), value.clone());
        written.insert(key, value);
    }
    written
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.data.lock().clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        Ok(pick(&self.data.lock(), keys))
    }

    async fn set(&self, record: Map<String, Value>) -> Result<Map<String, Value>, StorageError> {
        Ok(merge(&mut self.data.lock(), record))
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut guard = self.data.lock();
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            io: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_slice(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Backend(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(data)?)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StorageError> {
        let _io = self.io.lock();
        Ok(pick(&self.load()?, keys))
    }

    async fn set(&self, record: Map<String, Value>) -> Result<Map<String, Value>, StorageError> {
        let _io = self.io.lock();
        let mut data = self.load()?;
        let written = merge(&mut data, record);
        self.persist(&data)?;
        Ok(written)
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _io = self.io.lock();
        let mut data = self.load()?;
        let before = data.len();
        for key in keys {
            data.remove(*key);
        }
        if data.len() != before {
            self.persist(&data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_merges_and_removes() {
        let store = MemoryStore::new();
        let mut record = Map::new();
        record.insert("a".into(), json!(1));
        record.insert("b".into(), json!({"x": true}));
        let written = store.set(record).await.unwrap();
        assert_eq!(written.len(), 2);

        let mut update = Map::new();
        update.insert("a".into(), json!(2));
        store.set(update).await.unwrap();

        let found = store.get(&["a", "b", "missing"]).await.unwrap();
        assert_eq!(found.get("a"), Some(&json!(2)));
        assert_eq!(found.get("b"), Some(&json!({"x": true})));
        assert!(!found.contains_key("missing"));

        store.remove(&["a", "missing"]).await.unwrap();
        assert!(store.get(&["a"]).await.unwrap().is_empty());

        store.reset();
        assert!(store.get(&["b"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        {
            let store = FileStore::open(&path).unwrap();
            write_record(&store, "session", &json!({"lastActive": 5})).await.unwrap();
        }
        let reopened = FileStore::open(&path).unwrap();
        let value: Option<Value> = read_record(&reopened, "session").await.unwrap();
        assert_eq!(value, Some(json!({"lastActive": 5})));

        reopened.remove(&["session"]).await.unwrap();
        let gone: Option<Value> = read_record(&reopened, "session").await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn file_store_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).unwrap();
        for n in 0..3 {
            write_record(&store, "session", &json!({"n": n})).await.unwrap();
        }
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("store.json")]);
        let value: Option<Value> = read_record(&store, "session").await.unwrap();
        assert_eq!(value, Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn file_store_rejects_non_object_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"[1,2,3]").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert!(matches!(
            store.get(&["vault"]).await,
            Err(StorageError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn malformed_record_is_reported_as_corrupt() {
        #[derive(Debug, serde::Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            count: u32,
        }
        let store = MemoryStore::new();
        write_record(&store, "strict", &json!({"count": "many"})).await.unwrap();
        let err = read_record::<Strict>(&store, "strict").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { ref key, .. } if key == "strict"));
    }
}
