use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Storage key holding the raw bearer string
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the JSON-serialized identity
pub const USER_KEY: &str = "user";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Durable key/value storage for the persisted session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Apply several writes (`Some`) and removals (`None`) together.
    /// Backends that can do this in one step override it.
    fn apply(&self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    entries: BTreeMap<String, String>,
    updated_at: Option<DateTime<Utc>>,
}

/// File-backed store: all keys live in one JSON document.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(SESSION_FILE))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last successful write, if the file exists and parses.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        let _guard = self.lock.lock();
        self.read().ok().and_then(|stored| stored.updated_at)
    }

    fn read(&self) -> Result<StoredEntries> {
        if !self.path.exists() {
            return Ok(StoredEntries::default());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    /// Read for modification. A corrupt file is replaced rather than blocking writes.
    fn read_for_update(&self) -> StoredEntries {
        match self.read() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, path = ?self.path, "Discarding unreadable session file");
                StoredEntries::default()
            }
        }
    }

    fn write(&self, mut stored: StoredEntries) -> Result<()> {
        if stored.entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        stored.updated_at = Some(Utc::now());
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.apply(&[(key, None)])
    }

    fn apply(&self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut stored = self.read_for_update();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    stored.entries.insert(key.to_string(), value.to_string());
                }
                None => {
                    stored.entries.remove(*key);
                }
            }
        }
        self.write(stored)
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn apply(&self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        let mut entries = self.entries.lock();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    entries.insert(key.to_string(), value.to_string());
                }
                None => {
                    entries.remove(*key);
                }
            }
        }
        Ok(())
    }
}
