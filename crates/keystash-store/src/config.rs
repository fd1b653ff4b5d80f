//! Store configuration.
//!
//! [`StoreConfig`] is read from a TOML file; every field has a default so an
//! empty (or missing) file yields a working SQLite-backed setup. A couple of
//! environment variables override paths at startup.
//!
//! ```toml
//! notify_debounce_ms = 10
//! uncached_slots = ["chains"]
//!
//! [backend]
//! kind = "directory"
//! path = "data/slots"
//!
//! [backup]
//! hostname = "app.example.org"
//! essential_slots = ["settings", "accounts"]
//! timestamped_slots = ["accounts"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::notifier::DEFAULT_DEBOUNCE;

/// Overrides the backend path.
pub const ENV_BACKEND_PATH: &str = "KEYSTASH_BACKEND_PATH";
/// Overrides the hostname used in backup filenames.
pub const ENV_HOSTNAME: &str = "KEYSTASH_HOSTNAME";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backing adapter to open.
    pub backend: BackendConfig,
    /// Coalescing window for change notifications, in milliseconds.
    ///
    /// Every mutation pushes the pending notification back by this much.
    /// `0` fires as soon as the timer task is polled, which only coalesces
    /// reliably on a current-thread runtime.
    pub notify_debounce_ms: u64,
    /// Slots whose stores re-read the backend on every access.
    pub uncached_slots: Vec<String>,
    /// Backup allow-lists and naming.
    pub backup: BackupConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            notify_debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            uncached_slots: Vec::new(),
            backup: BackupConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), backend = config.backend.kind(), "config loaded");
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_BACKEND_PATH).filter(|p| !p.is_empty()) {
            self.backend = self.backend.with_path(PathBuf::from(path));
        }
        if let Some(host) = lookup(ENV_HOSTNAME).filter(|h| !h.is_empty()) {
            self.backup.hostname = host;
        }
    }

    pub fn notify_debounce(&self) -> Duration {
        Duration::from_millis(self.notify_debounce_ms)
    }

    /// Whether stores for `slot` keep their view in memory.
    pub fn caching_for(&self, slot: &str) -> bool {
        !self.uncached_slots.iter().any(|s| s == slot)
    }
}

/// Backing adapter selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process memory only.
    Memory,
    /// SQLite database file.
    Sqlite { path: PathBuf },
    /// Directory with one JSON file per slot.
    Directory { path: PathBuf },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("data/keystash.db"),
        }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite { .. } => "sqlite",
            Self::Directory { .. } => "directory",
        }
    }

    /// Same backend kind at a different path. Memory has no path.
    fn with_path(&self, path: PathBuf) -> Self {
        match self {
            Self::Memory => Self::Memory,
            Self::Sqlite { .. } => Self::Sqlite { path },
            Self::Directory { .. } => Self::Directory { path },
        }
    }
}

/// Backup allow-lists and naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Host the backup is taken on; first component of the filename.
    pub hostname: String,
    /// Replaces `localhost` in filenames.
    pub localhost_label: String,
    /// Slots included in every backup, in document order.
    pub essential_slots: Vec<String>,
    /// Slots whose records carry a `fileBackupTS` field.
    pub timestamped_slots: Vec<String>,
    /// Extra nested records that also carry `fileBackupTS`.
    pub timestamp_targets: Vec<TimestampTarget>,
    /// Reserved top-level field holding the filename hash.
    pub identity_field: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            localhost_label: "local".into(),
            essential_slots: ["settings", "accounts", "identities", "contacts"]
                .map(String::from)
                .to_vec(),
            timestamped_slots: ["accounts", "identities"].map(String::from).to_vec(),
            timestamp_targets: vec![TimestampTarget {
                slot: "settings".into(),
                entry: "messaging".into(),
                path: vec!["user".into()],
            }],
            identity_field: "backupId".into(),
        }
    }
}

/// A nested object that receives `fileBackupTS`: `slot[entry].path...`.
///
/// The target is skipped when any step along the path is missing or is not
/// an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampTarget {
    pub slot: String,
    pub entry: String,
    #[serde(default)]
    pub path: Vec<String>,
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn parses_full_file() {
        let cfg = StoreConfig::from_toml_str(
            r#"
            notify_debounce_ms = 25
            uncached_slots = ["chains"]

            [backend]
            kind = "directory"
            path = "/tmp/slots"

            [backup]
            hostname = "app.example.org"
            essential_slots = ["settings"]
            timestamped_slots = []

            [[backup.timestamp_targets]]
            slot = "settings"
            entry = "profile"
            "#,
        )
        .unwrap();

        assert_eq!(
            cfg.backend,
            BackendConfig::Directory {
                path: PathBuf::from("/tmp/slots")
            }
        );
        assert_eq!(cfg.notify_debounce(), Duration::from_millis(25));
        assert!(!cfg.caching_for("chains"));
        assert!(cfg.caching_for("settings"));
        assert_eq!(cfg.backup.hostname, "app.example.org");
        assert_eq!(cfg.backup.localhost_label, "local");
        assert!(cfg.backup.timestamped_slots.is_empty());
        assert_eq!(cfg.backup.timestamp_targets[0].path, Vec::<String>::new());
    }

    #[test]
    fn memory_backend_kind() {
        let cfg = StoreConfig::from_toml_str("[backend]\nkind = \"memory\"").unwrap();
        assert_eq!(cfg.backend, BackendConfig::Memory);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = StoreConfig::from_toml_str("[backend]\nkind = \"floppy\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn env_overrides() {
        let mut cfg = StoreConfig::default();
        cfg.apply_env_from(|key| match key {
            ENV_BACKEND_PATH => Some("/var/lib/keystash.db".into()),
            ENV_HOSTNAME => Some("box-7".into()),
            _ => None,
        });
        assert_eq!(
            cfg.backend,
            BackendConfig::Sqlite {
                path: PathBuf::from("/var/lib/keystash.db")
            }
        );
        assert_eq!(cfg.backup.hostname, "box-7");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn shipped_config_matches_defaults_except_uncached() {
        let cfg = StoreConfig::from_toml_str(include_str!("../../../config/keystash.toml")).unwrap();
        assert_eq!(cfg.backend, BackendConfig::default());
        assert_eq!(cfg.backup, BackupConfig::default());
        assert_eq!(cfg.uncached_slots, ["chains"]);
    }
}
