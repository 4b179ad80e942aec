//! Persisted settings.
//!
//! The auth record is a flat key-value set. Every mutation is written
//! through immediately; the last write wins. The device identifier lives in
//! its own file so that logging out never changes which device a token is
//! bound to.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, TypeAssistError};

pub const KEY_TOKEN: &str = "token";
pub const KEY_EMAIL: &str = "email";
pub const KEY_CREDITS: &str = "credits";
pub const KEY_DEVICE_ID: &str = "deviceId";
pub const KEY_AUTHENTICATED: &str = "authenticated";

const SETTINGS_FILE: &str = "typeassist-auth.json";
const DEVICE_ID_FILE: &str = "device-id";

/// Snapshot of the stored authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRecord {
    pub token: String,
    pub email: String,
    pub credits: u64,
    pub device_id: String,
    pub authenticated: bool,
}

pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    fn has_token(&self) -> bool {
        self.get_str(KEY_TOKEN).is_some()
    }

    /// Reads the record with the defaults of an empty store filled in.
    fn auth_record(&self) -> AuthRecord {
        AuthRecord {
            token: self.get_str(KEY_TOKEN).unwrap_or_default(),
            email: self.get_str(KEY_EMAIL).unwrap_or_default(),
            credits: self.get(KEY_CREDITS).and_then(|v| v.as_u64()).unwrap_or(0),
            device_id: self.get_str(KEY_DEVICE_ID).unwrap_or_default(),
            authenticated: self
                .get(KEY_AUTHENTICATED)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).filter(|v| !v.is_null()).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.values.clear();
        Ok(())
    }
}

/// JSON object on disk, rewritten on every mutation.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = read_values(&path)?;
        tracing::debug!(path = %path.display(), keys = values.len(), "Settings loaded");
        Ok(Self { path, values })
    }

    /// Like [`open`](Self::open), but a corrupt file is treated as empty.
    ///
    /// The file itself is only replaced on the next mutation.
    pub fn open_or_reset(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match read_values(&path) {
            Ok(values) => values,
            Err(TypeAssistError::Settings(reason)) => {
                tracing::warn!(path = %path.display(), %reason, "Discarding unreadable settings");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a sibling temp file and renames it over the settings file.
    fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let write_err =
            |e: std::io::Error| TypeAssistError::settings(format!("failed to write {}: {}", self.path.display(), e));
        let mut file = NamedTempFile::new_in(&dir).map_err(write_err)?;
        serde_json::to_writer_pretty(&mut file, &self.values)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<Map<String, Value>> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(Map::new()),
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
            TypeAssistError::settings(format!(
                "corrupt settings file {}: {} (run `typeassist logout` to reset it)",
                path.display(),
                e
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).filter(|v| !v.is_null()).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.values.clear();
        self.flush()
    }
}

/// Directory holding the settings and device id files.
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "typeassist").map(|dirs| dirs.data_local_dir().to_path_buf())
}

pub fn default_settings_path() -> Result<PathBuf> {
    data_dir()
        .map(|dir| dir.join(SETTINGS_FILE))
        .ok_or_else(|| TypeAssistError::settings("could not determine a data directory"))
}

/// Returns the device id stored next to `settings_path`, creating it on first use.
pub fn load_or_create_device_id(settings_path: &Path) -> Result<String> {
    let path = settings_path
        .parent()
        .map(|dir| dir.join(DEVICE_ID_FILE))
        .unwrap_or_else(|| PathBuf::from(DEVICE_ID_FILE));

    match std::fs::read_to_string(&path) {
        Ok(existing) if !existing.trim().is_empty() => return Ok(existing.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let id = uuid::Uuid::new_v4().simple().to_string();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &id)?;
    tracing::info!(path = %path.display(), "Generated new device id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_store_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.auth_record(), AuthRecord::default());
        assert!(!store.has_token());
    }

    #[test]
    fn test_last_write_wins_and_delete() {
        let mut store = MemoryStore::new();
        store.set(KEY_CREDITS, json!(5)).unwrap();
        store.set(KEY_CREDITS, json!(4)).unwrap();
        assert_eq!(store.auth_record().credits, 4);

        store.set(KEY_TOKEN, json!("")).unwrap();
        assert!(!store.has_token());
        store.set(KEY_TOKEN, json!("tok")).unwrap();
        assert!(store.has_token());
        store.delete(KEY_TOKEN).unwrap();
        assert!(!store.has_token());
    }

    #[test]
    fn test_file_store_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut store = FileStore::open(&path).unwrap();
        store.set(KEY_TOKEN, json!("abc")).unwrap();
        store.set(KEY_EMAIL, json!("a@b.c")).unwrap();
        store.set(KEY_AUTHENTICATED, json!(true)).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        let record = reopened.auth_record();
        assert_eq!(record.token, "abc");
        assert_eq!(record.email, "a@b.c");
        assert!(record.authenticated);

        let mut reopened = reopened;
        reopened.clear().unwrap();
        assert_eq!(FileStore::open(&path).unwrap().auth_record(), AuthRecord::default());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(TypeAssistError::Settings(_))
        ));
    }

    #[test]
    fn test_corrupt_file_can_be_reset_by_logout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{\"token\": \"ab").unwrap();

        let mut store = FileStore::open_or_reset(&path).unwrap();
        assert_eq!(store.auth_record(), AuthRecord::default());
        // untouched until something is written
        assert!(FileStore::open(&path).is_err());

        store.clear().unwrap();
        assert_eq!(FileStore::open(&path).unwrap().auth_record(), AuthRecord::default());
    }

    #[test]
    fn test_flush_leaves_only_the_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        let mut store = FileStore::open(&path).unwrap();
        store.set(KEY_TOKEN, json!("abc")).unwrap();
        store.set(KEY_CREDITS, json!(3)).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(SETTINGS_FILE)]);
        assert_eq!(FileStore::open(&path).unwrap().auth_record().credits, 3);
    }

    #[test]
    fn test_device_id_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join(SETTINGS_FILE);

        let first = load_or_create_device_id(&settings).unwrap();
        let second = load_or_create_device_id(&settings).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }
}
