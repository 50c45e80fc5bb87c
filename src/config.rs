//! Configuration types for the device bridge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Call-state monitor timing and queue settings.
    pub calls: CallConfig,
    /// Installed-app listing and launch settings.
    pub apps: AppsConfig,
    /// Host command channel sizing.
    pub host: HostConfig,
    /// Contacts seeded into the in-memory directory.
    pub contacts: ContactsConfig,
}

/// Call-state monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// How long to wait for a caller number after a ring without one before
    /// announcing the call as withheld.
    pub hidden_number_fallback_ms: u64,
    /// Upper bound on a single contact lookup.
    pub lookup_timeout_ms: u64,
    /// Capacity of the raw telephony event queue.
    pub event_queue_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            hidden_number_fallback_ms: 1000,
            lookup_timeout_ms: 1500,
            event_queue_capacity: 32,
        }
    }
}

impl CallConfig {
    #[must_use]
    pub fn hidden_number_fallback(&self) -> Duration {
        Duration::from_millis(self.hidden_number_fallback_ms)
    }

    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Installed-app catalogue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsConfig {
    /// Package name of the shell itself; always excluded from listings.
    pub own_package: String,
    /// Open the store listing when a package has no launcher entry.
    pub store_fallback: bool,
    /// Prefix the package name is appended to for the store listing.
    pub store_url_prefix: String,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            own_package: String::new(),
            store_fallback: true,
            store_url_prefix: "market://details?id=".to_owned(),
        }
    }
}

/// Host command channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Pending command requests buffered before senders wait.
    pub request_capacity: usize,
    /// Event broadcast buffer; slow subscribers lag past this.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

/// Contacts known to the in-memory directory, keyed by phone number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsConfig {
    pub entries: BTreeMap<String, String>,
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BridgeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }

    /// Returns the default config file path (`bridge_dirs::config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::bridge_dirs::config_file()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        assert_eq!(config.calls.hidden_number_fallback(), Duration::from_secs(1));
        assert!(config.calls.lookup_timeout_ms > 0);
        assert!(config.calls.event_queue_capacity > 0);
        assert!(config.apps.store_fallback);
        assert!(config.host.request_capacity > 0);
        assert!(config.host.event_capacity > 0);
        assert!(config.contacts.entries.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BridgeConfig::default();
        config.calls.hidden_number_fallback_ms = 250;
        config.apps.own_package = "com.example.shell".to_owned();
        config
            .contacts
            .entries
            .insert("+15550100".to_owned(), "Ada".to_owned());

        config.save_to_file(&path).expect("save config");
        let loaded = BridgeConfig::from_file(&path).expect("load config");

        assert_eq!(loaded.calls.hidden_number_fallback_ms, 250);
        assert_eq!(loaded.apps.own_package, "com.example.shell");
        assert_eq!(
            loaded.contacts.entries.get("+15550100").map(String::as_str),
            Some("Ada")
        );
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = BridgeConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "calls = [not valid").expect("write bad toml");
        assert!(matches!(
            BridgeConfig::from_file(&path),
            Err(crate::error::BridgeError::Config(_))
        ));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[calls]
lookup_timeout_ms = 200

[contacts.entries]
"555-0100" = "Grace"
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.calls.lookup_timeout_ms, 200);
        assert_eq!(config.calls.hidden_number_fallback_ms, 1000);
        assert_eq!(config.apps.store_url_prefix, "market://details?id=");
        assert_eq!(config.contacts.entries.len(), 1);
    }

    #[test]
    fn load_or_default_without_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = BridgeConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.host.request_capacity, 64);
    }
}
