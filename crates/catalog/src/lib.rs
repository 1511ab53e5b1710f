use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Key of the drawn-features snapshot.
pub const FEATURES_KEY: &str = "mapDrawFeatures";
/// Key of the markers snapshot.
pub const MARKERS_KEY: &str = "mapMarkers";
/// Key of the preferred map platform (`mapbox` or `google`).
pub const PLATFORM_KEY: &str = "preferredMapPlatform";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("browser storage unavailable")]
    Unavailable,
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("snapshot storage corrupt: {0}")]
    Corrupt(String),
    #[error("snapshot storage error: {0}")]
    Io(String),
}

/// Synchronous string key-value store holding serialized snapshots.
///
/// Mirrors the browser `localStorage` contract: a key maps to one string,
/// writes replace the whole value.
pub trait SnapshotStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
}

/// Shared handle so several stores (features, markers, preferences) can
/// write into one backing sink.
impl<S: SnapshotStore> SnapshotStore for Rc<RefCell<S>> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.borrow().read(key)
    }

    fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.borrow_mut().write(key, raw)
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        self.borrow_mut().remove(key)
    }
}

impl SnapshotStore for Box<dyn SnapshotStore> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.as_ref().read(key)
    }

    fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError> {
        self.as_mut().write(key, raw)
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        self.as_mut().remove(key)
    }
}

/// Reads and decodes a JSON value. Empty or missing entries are `None`.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.read(key)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<T>(&raw)
        .map(Some)
        .map_err(|e| StorageError::Corrupt(e.to_string()))
}

pub fn write_json<T: Serialize + ?Sized>(
    store: &mut dyn SnapshotStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Io(e.to_string()))?;
    store.write(key, &raw)
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    entries: BTreeMap<String, String>,
    read_only: bool,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes, like a browser with a full storage quota.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        if self.read_only {
            return Err(StorageError::Io("storage quota exceeded".to_string()));
        }
        self.entries.insert(key.to_string(), raw.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        if self.read_only {
            return Err(StorageError::Io("storage quota exceeded".to_string()));
        }
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod directory {
    use std::path::{Path, PathBuf};

    use super::{SnapshotStore, StorageError, validate_key};

    /// One `<key>.json` file per key inside a directory.
    #[derive(Debug, Clone)]
    pub struct DirectorySnapshotStore {
        root: PathBuf,
    }

    impl DirectorySnapshotStore {
        pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
            let root = root.into();
            std::fs::create_dir_all(&root)
                .map_err(|e| StorageError::Io(format!("create {}: {e}", root.display())))?;
            Ok(Self { root })
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
            validate_key(key)?;
            Ok(self.root.join(format!("{key}.json")))
        }
    }

    impl SnapshotStore for DirectorySnapshotStore {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            let path = self.path_for(key)?;
            match std::fs::read_to_string(&path) {
                Ok(raw) => Ok(Some(raw)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::Io(format!("read {}: {e}", path.display()))),
            }
        }

        fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError> {
            let path = self.path_for(key)?;
            // Write-then-rename so a crash never leaves a truncated snapshot.
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, raw)
                .map_err(|e| StorageError::Io(format!("write {}: {e}", tmp.display())))?;
            std::fs::rename(&tmp, &path)
                .map_err(|e| StorageError::Io(format!("rename {}: {e}", path.display())))?;
            tracing::debug!(key, bytes = raw.len(), "snapshot written");
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            let path = self.path_for(key)?;
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StorageError::Io(format!("remove {}: {e}", path.display()))),
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use directory::DirectorySnapshotStore;

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{SnapshotStore, StorageError};

    /// `window.localStorage`, optionally namespaced with a key prefix.
    #[derive(Debug, Default)]
    pub struct LocalStorageSnapshotStore {
        key_prefix: String,
    }

    impl LocalStorageSnapshotStore {
        pub fn new(key_prefix: impl Into<String>) -> Result<Self, StorageError> {
            // Fail early when storage is disabled (private mode, sandboxed iframes).
            window_local_storage()?;
            Ok(Self {
                key_prefix: key_prefix.into(),
            })
        }

        fn full_key(&self, key: &str) -> String {
            format!("{}{}", self.key_prefix, key)
        }
    }

    impl SnapshotStore for LocalStorageSnapshotStore {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            super::validate_key(key)?;
            let storage = window_local_storage()?;
            storage
                .get_item(&self.full_key(key))
                .map_err(|e| StorageError::Io(format!("get_item failed: {:?}", e)))
        }

        fn write(&mut self, key: &str, raw: &str) -> Result<(), StorageError> {
            super::validate_key(key)?;
            let storage = window_local_storage()?;
            storage
                .set_item(&self.full_key(key), raw)
                .map_err(|e| StorageError::Io(format!("set_item failed: {:?}", e)))
        }

        fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
            super::validate_key(key)?;
            let storage = window_local_storage()?;
            let full = self.full_key(key);
            let existed = storage
                .get_item(&full)
                .map_err(|e| StorageError::Io(format!("get_item failed: {:?}", e)))?
                .is_some();
            storage
                .remove_item(&full)
                .map_err(|e| StorageError::Io(format!("remove_item failed: {:?}", e)))?;
            Ok(existed)
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StorageError> {
        let win = web_sys::window().ok_or(StorageError::Unavailable)?;
        win.local_storage()
            .map_err(|e| StorageError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageSnapshotStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageSnapshotStore;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSnapshotStore {
    pub fn new(_key_prefix: impl Into<String>) -> Result<Self, StorageError> {
        Err(StorageError::Unavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SnapshotStore for LocalStorageSnapshotStore {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn write(&mut self, _key: &str, _raw: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove(&mut self, _key: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let mut store = InMemorySnapshotStore::new();
        assert_eq!(store.read(FEATURES_KEY).unwrap(), None);
        store.write(FEATURES_KEY, "[]").unwrap();
        assert_eq!(store.read(FEATURES_KEY).unwrap().as_deref(), Some("[]"));
        assert!(store.remove(FEATURES_KEY).unwrap());
        assert!(!store.remove(FEATURES_KEY).unwrap());
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let mut store = InMemorySnapshotStore::new();
        store.write(MARKERS_KEY, "[]").unwrap();
        store.set_read_only(true);
        assert!(matches!(
            store.write(MARKERS_KEY, "[1]"),
            Err(StorageError::Io(_))
        ));
        assert_eq!(store.read(MARKERS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn rejects_path_like_keys() {
        let mut store = InMemorySnapshotStore::new();
        assert_eq!(
            store.write("../etc", "x"),
            Err(StorageError::InvalidKey("../etc".to_string()))
        );
        assert!(store.read("").is_err());
    }

    #[test]
    fn shared_handle_writes_through() {
        let shared = Rc::new(RefCell::new(InMemorySnapshotStore::new()));
        let mut a = shared.clone();
        let b = shared.clone();
        a.write(PLATFORM_KEY, "google").unwrap();
        assert_eq!(b.read(PLATFORM_KEY).unwrap().as_deref(), Some("google"));
        let keys: Vec<String> = shared.borrow().keys().map(str::to_string).collect();
        assert_eq!(keys, vec![PLATFORM_KEY.to_string()]);
    }

    #[test]
    fn json_helpers_treat_blank_as_missing() {
        let mut store = InMemorySnapshotStore::new();
        store.write("blank", "   ").unwrap();
        assert_eq!(read_json::<Vec<u32>>(&store, "blank").unwrap(), None);

        write_json(&mut store, "nums", &vec![1u32, 2, 3]).unwrap();
        assert_eq!(
            read_json::<Vec<u32>>(&store, "nums").unwrap(),
            Some(vec![1, 2, 3])
        );

        store.write("bad", "{not json").unwrap();
        assert!(matches!(
            read_json::<Vec<u32>>(&store, "bad"),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn directory_store_persists_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectorySnapshotStore::open(dir.path().join("data")).unwrap();
        store.write(FEATURES_KEY, "[{\"id\":\"a\"}]").unwrap();
        assert!(store.root().join("mapDrawFeatures.json").exists());

        let reopened = DirectorySnapshotStore::open(dir.path().join("data")).unwrap();
        assert_eq!(
            reopened.read(FEATURES_KEY).unwrap().as_deref(),
            Some("[{\"id\":\"a\"}]")
        );
        assert_eq!(reopened.read(MARKERS_KEY).unwrap(), None);
        assert!(store.remove(FEATURES_KEY).unwrap());
        assert!(!store.remove(FEATURES_KEY).unwrap());
    }

    #[test]
    fn local_storage_is_unavailable_natively() {
        assert!(matches!(
            LocalStorageSnapshotStore::new("topomap."),
            Err(StorageError::Unavailable)
        ));
    }
}
