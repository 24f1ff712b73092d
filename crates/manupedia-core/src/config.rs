//! Application configuration management.
//!
//! Holds the backend URL, the session storage backend and the last email
//! used to log in. Stored at `~/.config/manupedia/config.json`; the
//! `MANUPEDIA_API_URL` and `MANUPEDIA_STORAGE` environment variables take
//! precedence over the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::{DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{FileStore, KeychainStore, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "manupedia";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "MANUPEDIA_API_URL";
const ENV_STORAGE: &str = "MANUPEDIA_STORAGE";

/// Where the persisted session lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keychain,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keychain" | "keyring" => Ok(StorageBackend::Keychain),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(storage) = var(ENV_STORAGE) {
            match storage.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_STORAGE),
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the configured session store.
    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(&Self::data_dir()?)),
            StorageBackend::Keychain => Arc::new(KeychainStore::new()),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage":"keychain"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::Keychain);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.last_email, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            (ENV_API_URL, " https://manupedia.example "),
            (ENV_STORAGE, "Keyring"),
        ]));
        assert_eq!(config.api_base_url, "https://manupedia.example");
        assert_eq!(config.storage, StorageBackend::Keychain);
    }

    #[test]
    fn test_bad_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_API_URL, "  "), (ENV_STORAGE, "cloud")]));
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_data_dir_is_app_scoped() {
        if let Ok(dir) = Config::data_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
