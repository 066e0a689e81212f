//! Broker configuration - plain JSON outside the vault.
//!
//! Readable before unlock so the idle timeout and endpoint apply from the
//! first session. Nothing in here is secret, but the file still gets the
//! same `0600` atomic-write treatment as everything else in the data
//! directory.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use coffret_vault::fsutil::write_file_0600;

const CONFIG_FILE: &str = "config.json";

/// Non-secret broker settings.
///
/// Persisted to `{data_dir}/config.json`; all fields have defaults so a
/// missing or corrupt file falls back cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Minutes of inactivity before the vault auto-locks.
    #[serde(default = "default_idle_lock_timeout")]
    pub idle_lock_timeout_minutes: u64,

    /// Whether the broker may contact the licence server on its own
    /// (update checks, licence refresh). Explicit activation always
    /// works; this only gates the automatic paths. Off by default.
    #[serde(default)]
    pub online_checks_enabled: bool,

    /// Licence activation endpoint.
    #[serde(default = "default_license_endpoint")]
    pub license_endpoint: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            idle_lock_timeout_minutes: default_idle_lock_timeout(),
            online_checks_enabled: false,
            license_endpoint: default_license_endpoint(),
        }
    }
}

const fn default_idle_lock_timeout() -> u64 {
    5
}

fn default_license_endpoint() -> String {
    "https://licence.coffret.app/api/check".into()
}

impl BrokerConfig {
    /// Load from `{data_dir}/config.json`, falling back to defaults when
    /// the file is missing or invalid.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| serde_json::from_str(&contents).unwrap_or_default(),
        )
    }

    /// Persist to `{data_dir}/config.json` (atomic, `0600`).
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename fails.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write_file_0600(&data_dir.join(CONFIG_FILE), &json)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_conservative() {
        let config = BrokerConfig::default();
        assert_eq!(config.idle_lock_timeout_minutes, 5);
        assert!(!config.online_checks_enabled);
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(BrokerConfig::load(dir.path()), BrokerConfig::default());
    }

    #[test]
    fn load_recovers_from_corrupt_file() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "{{{").expect("write");
        assert_eq!(BrokerConfig::load(dir.path()), BrokerConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let config = BrokerConfig {
            idle_lock_timeout_minutes: 12,
            online_checks_enabled: true,
            ..BrokerConfig::default()
        };
        config.save(dir.path()).expect("save should succeed");
        assert_eq!(BrokerConfig::load(dir.path()), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"idleLockTimeoutMinutes": 30}"#,
        )
        .expect("write");
        let config = BrokerConfig::load(dir.path());
        assert_eq!(config.idle_lock_timeout_minutes, 30);
        assert!(!config.online_checks_enabled);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json =
            serde_json::to_string(&BrokerConfig::default()).expect("serialize should succeed");
        assert!(json.contains("idleLockTimeoutMinutes"));
        assert!(json.contains("onlineChecksEnabled"));
        assert!(!json.contains("idle_lock_timeout_minutes"));
    }
}
