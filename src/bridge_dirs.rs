//! Centralized directory paths for the bridge.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/callbridge/` | `~/.config/callbridge/` |
//!
//! Set `CALLBRIDGE_CONFIG_DIR` to override [`config_dir`].

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/callbridge/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CALLBRIDGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("callbridge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/callbridge-config"))
}

/// Main config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        let s = path.to_string_lossy();
        assert!(s.ends_with("config.toml"), "config_file: {s}");
    }

    #[test]
    fn config_file_lives_in_config_dir() {
        assert!(config_file().starts_with(config_dir()));
    }
}
