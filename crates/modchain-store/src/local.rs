//! LocalStore: a namespaced key-value cache over a filesystem tree.
//!
//! Each key is a `/`-separated relative path mapped to `<root>/<key>.json`.
//! Values are wrapped with their write time so reads can treat old entries
//! as misses. With a password configured, values are sealed before they
//! touch the disk and opened on read.
//!
//! On-disk entry forms:
//!
//! ```text
//! {"time": 1736870400000, "data": <json>}
//! {"time": 1736870400000, "encrypted_data": "<hex nonce||ciphertext>"}
//! ```

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use modchain_core::{now_millis, validate_path};

use crate::cipher::{EntryCipher, SealedEntry};
use crate::error::{Result, StoreError};

/// Configuration for a [`LocalStore`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    /// Directory holding every entry.
    pub root: PathBuf,

    /// Password for entry encryption. Never serialized.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// File extension for entry files.
    pub extension: String,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".modchain/storage"),
            password: None,
            extension: "json".into(),
        }
    }
}

impl std::fmt::Debug for LocalStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStoreConfig")
            .field("root", &self.root)
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("extension", &self.extension)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct Entry {
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_data: Option<String>,
}

impl Entry {
    fn age_millis(&self, now: i64) -> i64 {
        (now - self.time).max(0)
    }
}

/// Filesystem-backed key-value cache with optional per-entry encryption.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    extension: String,
    cipher: Option<EntryCipher>,
}

impl LocalStore {
    /// Open (creating if needed) a store with the given configuration.
    pub fn open(config: LocalStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        Ok(Self {
            root: config.root,
            extension: config.extension,
            cipher: config.password.as_deref().map(EntryCipher::from_password),
        })
    }

    /// Open an unencrypted store at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(LocalStoreConfig {
            root: root.into(),
            ..LocalStoreConfig::default()
        })
    }

    /// The directory holding every entry.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether new writes are encrypted.
    pub fn has_password(&self) -> bool {
        self.cipher.is_some()
    }

    /// Write `value` under `key`, stamped with the current time.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key)?;
        let entry = self.seal_entry(value, now_millis())?;
        write_entry(&path, &entry)?;
        debug!(key, encrypted = entry.encrypted_data.is_some(), "local store put");
        Ok(())
    }

    /// Read the value under `key`.
    ///
    /// Returns `None` if absent, or if older than `max_age`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, max_age: Option<Duration>) -> Result<Option<T>> {
        let path = self.path_for(key)?;
        let Some(entry) = read_entry(&path)? else {
            return Ok(None);
        };

        if let Some(max_age) = max_age {
            if entry.age_millis(now_millis()) as u128 > max_age.as_millis() {
                debug!(key, "local store entry stale");
                return Ok(None);
            }
        }

        let value = self.open_entry(key, entry)?;
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Read the value under `key`, falling back to `default` on a miss.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T, max_age: Option<Duration>) -> Result<T> {
        Ok(self.get(key, max_age)?.unwrap_or(default))
    }

    /// Delete `key`. Returns whether an entry existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether an entry exists under `key`, regardless of age.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    /// Every key starting with `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    /// Whether the entry under `key` is stored encrypted. Never decrypts.
    pub fn is_encrypted(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        read_entry(&path)?
            .map(|e| e.encrypted_data.is_some())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Time since the entry under `key` was written.
    pub fn age(&self, key: &str) -> Result<Option<Duration>> {
        let path = self.path_for(key)?;
        Ok(read_entry(&path)?.map(|e| Duration::from_millis(e.age_millis(now_millis()) as u64)))
    }

    /// Re-write every plaintext entry encrypted, keeping its write time.
    ///
    /// Returns the number of entries converted.
    pub fn encrypt_all(&self) -> Result<usize> {
        let Some(cipher) = &self.cipher else {
            return Err(StoreError::Encryption("no password configured".into()));
        };

        let mut converted = 0;
        for key in self.list("")? {
            let path = self.path_for(&key)?;
            let Some(entry) = read_entry(&path)? else {
                continue;
            };
            let Some(data) = entry.data else {
                continue;
            };

            let sealed = cipher.seal(&serde_json::to_vec(&data)?)?;
            let entry = Entry {
                time: entry.time,
                data: None,
                encrypted_data: Some(sealed.to_hex()),
            };
            write_entry(&path, &entry)?;
            converted += 1;
        }

        debug!(converted, "local store entries encrypted");
        Ok(converted)
    }

    /// Map a key to its entry file, rejecting keys that would escape the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_path(key).map_err(|_| StoreError::InvalidKey(key.to_string()))?;
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        let file_name = format!("{}.{}", key.rsplit('/').next().unwrap_or(key), self.extension);
        path.set_file_name(file_name);
        Ok(path)
    }

    fn seal_entry<T: Serialize + ?Sized>(&self, value: &T, time: i64) -> Result<Entry> {
        match &self.cipher {
            Some(cipher) => {
                let sealed = cipher.seal(&serde_json::to_vec(value)?)?;
                Ok(Entry {
                    time,
                    data: None,
                    encrypted_data: Some(sealed.to_hex()),
                })
            }
            None => Ok(Entry {
                time,
                data: Some(serde_json::to_value(value)?),
                encrypted_data: None,
            }),
        }
    }

    fn open_entry(&self, key: &str, entry: Entry) -> Result<serde_json::Value> {
        match (entry.data, entry.encrypted_data) {
            (_, Some(hex)) => {
                let cipher = self
                    .cipher
                    .as_ref()
                    .ok_or_else(|| StoreError::Locked(key.to_string()))?;
                let plaintext = cipher.open(&SealedEntry::from_hex(&hex)?)?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
            (Some(data), None) => Ok(data),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }

    fn collect_keys(&self, keys: &mut Vec<String>) -> Result<()> {
        if !self.root.is_dir() {
            return Ok(());
        }

        for dirent in WalkDir::new(&self.root).min_depth(1) {
            let dirent = dirent.map_err(|e| StoreError::Io(e.into()))?;
            if !dirent.file_type().is_file() {
                continue;
            }
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Ok(rel) = path.with_extension("").strip_prefix(&self.root).map(Path::to_path_buf) else {
                continue;
            };
            let key: Vec<&str> = rel.iter().filter_map(|c| c.to_str()).collect();
            keys.push(key.join("/"));
        }
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<Option<Entry>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file and rename so readers never see a torn entry.
///
/// Every write gets its own temp file, so concurrent writers to one key
/// never interleave.
fn write_entry(path: &Path, entry: &Entry) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&serde_json::to_vec(entry)?)?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::at(dir.path()).unwrap()
    }

    fn encrypted(dir: &tempfile::TempDir, password: &str) -> LocalStore {
        LocalStore::open(LocalStoreConfig {
            root: dir.path().to_path_buf(),
            password: Some(password.into()),
            ..LocalStoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut table = BTreeMap::new();
        table.insert("calc".to_string(), "abc".to_string());
        store.put("registry", &table).unwrap();

        let back: BTreeMap<String, String> = store.get("registry", None).unwrap().unwrap();
        assert_eq!(back, table);
        assert!(dir.path().join("registry.json").is_file());
    }

    #[test]
    fn test_missing_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let value: Option<u32> = store.get("nope", None).unwrap();
        assert!(value.is_none());
        assert_eq!(store.get_or("nope", 7u32, None).unwrap(), 7);
    }

    #[test]
    fn test_stale_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        // Hand-write an entry from a minute ago
        let old = serde_json::json!({"time": now_millis() - 60_000, "data": 5});
        fs::write(dir.path().join("old.json"), old.to_string()).unwrap();

        let fresh: Option<u32> = store.get("old", Some(Duration::from_secs(10))).unwrap();
        assert!(fresh.is_none());
        let any: Option<u32> = store.get("old", None).unwrap();
        assert_eq!(any, Some(5));
        assert!(store.age("old").unwrap().unwrap() >= Duration::from_secs(59));
    }

    #[test]
    fn test_nested_keys_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.put("versions/k1/calc", &1).unwrap();
        store.put("versions/k1/echo", &2).unwrap();
        store.put("versions/k2/calc", &3).unwrap();
        store.put("registry", &0).unwrap();

        assert_eq!(
            store.list("versions/k1/").unwrap(),
            vec!["versions/k1/calc".to_string(), "versions/k1/echo".to_string()]
        );
        assert_eq!(store.list("").unwrap().len(), 4);
        assert!(dir.path().join("versions/k2/calc.json").is_file());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.put("a", &1).unwrap();
        assert!(store.contains("a").unwrap());
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(!store.contains("a").unwrap());
    }

    #[test]
    fn test_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        for key in ["", "../escape", "/abs", "a//b", "a/./b"] {
            assert!(
                matches!(store.put(key, &1), Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = encrypted(&dir, "pw");

        store.put("secret", &"table").unwrap();
        assert!(store.is_encrypted("secret").unwrap());

        let raw = fs::read_to_string(dir.path().join("secret.json")).unwrap();
        assert!(raw.contains("encrypted_data"));
        assert!(!raw.contains("table"));

        let back: String = store.get("secret", None).unwrap().unwrap();
        assert_eq!(back, "table");
    }

    #[test]
    fn test_locked_and_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        encrypted(&dir, "right").put("secret", &1).unwrap();

        let plain = store(&dir);
        assert!(matches!(
            plain.get::<u32>("secret", None),
            Err(StoreError::Locked(_))
        ));

        let wrong = encrypted(&dir, "wrong");
        assert!(matches!(
            wrong.get::<u32>("secret", None),
            Err(StoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_encrypt_all() {
        let dir = tempfile::tempdir().unwrap();
        let plain = store(&dir);
        plain.put("a", &1).unwrap();
        plain.put("nested/b", &2).unwrap();
        assert!(!plain.is_encrypted("a").unwrap());

        let store = encrypted(&dir, "pw");
        assert_eq!(store.encrypt_all().unwrap(), 2);
        assert!(store.is_encrypted("a").unwrap());
        assert!(store.is_encrypted("nested/b").unwrap());
        assert_eq!(store.get::<u32>("nested/b", None).unwrap(), Some(2));

        // Already encrypted entries are left alone
        assert_eq!(store.encrypt_all().unwrap(), 0);
        assert!(plain.encrypt_all().is_err());
    }

    #[test]
    fn test_is_encrypted_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            store(&dir).is_encrypted("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store(&dir));

        let writers: Vec<_> = (0..8u32)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for round in 0..25u32 {
                        store.put("versions/k1/calc", &vec![i; round as usize]).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last: Vec<u32> = store.get("versions/k1/calc", None).unwrap().unwrap();
        assert_eq!(last.len(), 24);
        assert_eq!(store.list("").unwrap(), vec!["versions/k1/calc".to_string()]);
        let leftovers = fs::read_dir(dir.path().join("versions/k1")).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
