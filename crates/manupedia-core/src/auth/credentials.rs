use std::collections::{hash_map, HashMap};

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;

use super::storage::SessionStore;

const SERVICE_NAME: &str = "manupedia";

/// Session store backed by the OS keychain. Each key is its own entry.
///
/// `token` and `user` are two separate keychain writes, so unlike
/// [`FileStore`](super::FileStore) the pair is not replaced atomically. A
/// failure between them leaves a partial record, which start-up purges.
pub struct KeychainStore {
    service: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeychainStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name (separate profiles, tests).
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the entry for `key`, created on first use and kept
    /// for the life of the store.
    fn with_entry<T>(&self, key: &str, f: impl FnOnce(&Entry) -> Result<T>) -> Result<T> {
        let mut entries = self.entries.lock();
        let entry = match entries.entry(key.to_string()) {
            hash_map::Entry::Occupied(slot) => slot.into_mut(),
            hash_map::Entry::Vacant(slot) => slot.insert(
                Entry::new(&self.service, key).context("Failed to create keyring entry")?,
            ),
        };
        f(entry)
    }
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for KeychainStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session value from keychain"),
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entry(key, |entry| {
            entry
                .set_password(value)
                .context("Failed to store session value in keychain")
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session value from keychain"),
        })
    }
}
