//! Key-value storage backends.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};

/// A flat string key-value store.
///
/// Every call is synchronous and either fully succeeds or leaves the stored
/// value unchanged.
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend {
    /// Read a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Removing a missing key succeeds.
    fn remove(&mut self, key: &str) -> StorageResult<()>;

    /// Every stored key.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// In-memory storage with an optional byte quota over keys and values.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    quota: Option<u64>,
}

impl MemoryStorage {
    /// Unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses writes once keys plus values exceed `bytes`.
    pub fn with_quota(bytes: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(bytes),
        }
    }

    /// Bytes held across all keys and values.
    pub fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(quota) = self.quota {
            let replaced = self
                .entries
                .get(key)
                .map_or(0, |old| (key.len() + old.len()) as u64);
            let used = self.used_bytes() - replaced;
            let needed = (key.len() + value.len()) as u64;
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// One file per key in a directory.
///
/// Writes go to a hidden temporary file that is then renamed over the
/// target, so a reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open a directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if is_valid_key(key) {
            Ok(self.dir.join(key))
        } else {
            Err(StorageError::InvalidKey(key.to_string()))
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(name) = name.to_str().filter(|n| is_valid_key(n)) {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);
        storage.remove("a").unwrap();
        storage.remove("a").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn memory_quota_counts_keys_and_values() {
        let mut storage = MemoryStorage::with_quota(10);
        storage.set("k", "12345678").unwrap();
        assert!(matches!(
            storage.set("j", "1"),
            Err(StorageError::QuotaExceeded { needed: 2, available: 1, .. })
        ));
        storage.set("k", "123").unwrap();
        storage.set("j", "1").unwrap();
        assert_eq!(storage.used_bytes(), 6);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("saves")).unwrap();
        storage.set("game_auto_save", "{}").unwrap();
        storage.set("game_auto_save", "{\"v\":1}").unwrap();
        assert_eq!(
            storage.get("game_auto_save").unwrap().as_deref(),
            Some("{\"v\":1}")
        );
        assert_eq!(storage.get("missing").unwrap(), None);
        assert_eq!(storage.keys().unwrap(), vec!["game_auto_save"]);

        storage.remove("game_auto_save").unwrap();
        storage.remove("game_auto_save").unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn file_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        for key in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(
                storage.set(key, "x"),
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn file_keys_skip_temporaries_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".game_x.tmp"), "partial").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set("game_x.corrupted", "bad").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["game_x.corrupted"]);
    }
}
