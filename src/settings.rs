//! Persisted user settings (remote host, port, endpoint name, autoconnect)
//!
//! Settings live in a small key/value store. The sled-backed store is used by
//! the binary; [`MemorySettings`] backs tests and `--no-persist` runs.

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::endpoint::{Endpoint, EndpointError, DEFAULT_ENDPOINT_NAME};

pub const KEY_REMOTE_HOST: &str = "remote_host";
pub const KEY_REMOTE_PORT: &str = "remote_port";
pub const KEY_UMP_ENDPOINT: &str = "ump_endpoint";
pub const KEY_AUTOCONNECT: &str = "autoconnect";

pub const DEFAULT_REMOTE_HOST: &str = "zynthian.local";
pub const DEFAULT_REMOTE_PORT: u16 = 5504;

/// Key/value settings store
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Make previous writes durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Settings stored in an embedded sled database
pub struct SledSettings {
    db: sled::Db,
}

impl SledSettings {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open settings database at: {}", path.display()))?;
        info!("Settings store opened at: {}", path.display());
        Ok(Self { db })
    }
}

impl SettingsStore for SledSettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self
            .db
            .get(key)
            .with_context(|| format!("Failed to read setting '{}'", key))?
        else {
            return Ok(None);
        };
        let value = String::from_utf8(raw.to_vec())
            .with_context(|| format!("Setting '{}' is not valid UTF-8", key))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key, value.as_bytes())
            .with_context(|| format!("Failed to write setting '{}'", key))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush settings database")?;
        Ok(())
    }
}

/// In-memory settings store
#[derive(Default)]
pub struct MemorySettings {
    entries: DashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Current connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub remote_host: String,
    pub remote_port: u16,
    pub ump_endpoint: String,
    pub autoconnect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
            remote_port: DEFAULT_REMOTE_PORT,
            ump_endpoint: DEFAULT_ENDPOINT_NAME.to_string(),
            autoconnect: false,
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults for missing or malformed values
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();

        let remote_host = read(store, KEY_REMOTE_HOST)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(defaults.remote_host);

        let remote_port = match read(store, KEY_REMOTE_PORT) {
            None => defaults.remote_port,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    warn!("Ignoring invalid stored port '{}'", raw);
                    defaults.remote_port
                },
            },
        };

        let ump_endpoint = read(store, KEY_UMP_ENDPOINT).unwrap_or(defaults.ump_endpoint);

        let autoconnect = read(store, KEY_AUTOCONNECT)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.autoconnect);

        let settings = Self {
            remote_host,
            remote_port,
            ump_endpoint,
            autoconnect,
        };
        debug!("Settings loaded: {:?}", settings);
        settings
    }

    /// Endpoint for a connection attempt with these settings
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        Endpoint::new(&self.remote_host, self.remote_port, &self.ump_endpoint)
    }

    /// Remember the values a successful session was started with
    pub fn persist_endpoint(store: &dyn SettingsStore, endpoint: &Endpoint) -> Result<()> {
        store.set(KEY_REMOTE_HOST, endpoint.host())?;
        store.set(KEY_REMOTE_PORT, &endpoint.port().to_string())?;
        store.set(KEY_UMP_ENDPOINT, endpoint.display_name())?;
        store.flush()?;
        debug!(
            "Persisted endpoint {}:{} as '{}'",
            endpoint.host(),
            endpoint.port(),
            endpoint.display_name()
        );
        Ok(())
    }

    pub fn persist_autoconnect(store: &dyn SettingsStore, autoconnect: bool) -> Result<()> {
        store.set(KEY_AUTOCONNECT, if autoconnect { "true" } else { "false" })?;
        store.flush()
    }
}

fn read(store: &dyn SettingsStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read setting '{}', using default: {:#}", key, e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_empty() {
        let store = MemorySettings::new();
        let settings = Settings::load(&store);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.remote_port, 5504);
        assert!(!settings.autoconnect);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let store = MemorySettings::new();
        store.set(KEY_REMOTE_PORT, "70000").unwrap();
        store.set(KEY_AUTOCONNECT, "yes").unwrap();
        store.set(KEY_REMOTE_HOST, "   ").unwrap();

        let settings = Settings::load(&store);
        assert_eq!(settings.remote_port, DEFAULT_REMOTE_PORT);
        assert!(!settings.autoconnect);
        assert_eq!(settings.remote_host, DEFAULT_REMOTE_HOST);
    }

    #[test]
    fn test_autoconnect_parse_is_case_insensitive() {
        let store = MemorySettings::new();
        Settings::persist_autoconnect(&store, true).unwrap();
        assert_eq!(store.get(KEY_AUTOCONNECT).unwrap().as_deref(), Some("true"));
        store.set(KEY_AUTOCONNECT, "TRUE").unwrap();
        assert!(Settings::load(&store).autoconnect);
    }

    #[test]
    fn test_persist_endpoint() {
        let store = MemorySettings::new();
        let endpoint = Endpoint::new("10.0.0.5", 5504, "Studio").unwrap();
        Settings::persist_endpoint(&store, &endpoint).unwrap();

        let settings = Settings::load(&store);
        assert_eq!(settings.remote_host, "10.0.0.5");
        assert_eq!(settings.remote_port, 5504);
        assert_eq!(settings.ump_endpoint, "Studio");
        assert_eq!(settings.endpoint().unwrap(), endpoint);
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.sled");

        {
            let store = SledSettings::open(&path).unwrap();
            let endpoint = Endpoint::new("zynthian.local", 5673, "Keys").unwrap();
            Settings::persist_endpoint(&store, &endpoint).unwrap();
            Settings::persist_autoconnect(&store, true).unwrap();
        }

        let store = SledSettings::open(&path).unwrap();
        let settings = Settings::load(&store);
        assert_eq!(settings.remote_host, "zynthian.local");
        assert_eq!(settings.remote_port, 5673);
        assert_eq!(settings.ump_endpoint, "Keys");
        assert!(settings.autoconnect);
    }
}
