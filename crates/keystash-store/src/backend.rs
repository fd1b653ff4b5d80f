//! Backing adapters.
//!
//! A [`Backend`] is the durable, synchronous, string-keyed text store behind
//! every [`Store`](crate::Store). Three implementations ship with the crate:
//!
//! | Backend              | Storage                      | Use                 |
//! |----------------------|------------------------------|---------------------|
//! | [`MemoryBackend`]    | `BTreeMap` in RAM            | tests, scratch data |
//! | [`SqliteBackend`]    | one row per slot in SQLite   | default             |
//! | [`DirectoryBackend`] | one `<slot>.json` per slot   | human-inspectable   |
//!
//! The backend is chosen explicitly from [`BackendConfig`]; there is no
//! fallback that tries backends until one works.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::db::SqliteBackend;
use crate::error::{StoreError, StoreResult};

/// Capability interface over a durable slot store.
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Read the raw text of a slot, `None` if it has never been written.
    fn read(&self, slot: &str) -> StoreResult<Option<String>>;

    /// Replace the raw text of a slot.
    fn write(&self, slot: &str, text: &str) -> StoreResult<()>;

    /// Remove a slot, returning `true` if it existed.
    fn remove(&self, slot: &str) -> StoreResult<bool>;

    /// Names of every slot currently present.
    fn list_slots(&self) -> StoreResult<Vec<String>>;

    /// When the slot was last written, if the backend tracks it.
    fn modified_at(&self, _slot: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Open the backend described by `config`.
pub fn open_backend(config: &BackendConfig) -> StoreResult<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config {
        BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        BackendConfig::Sqlite { path } => Arc::new(SqliteBackend::open(path)?),
        BackendConfig::Directory { path } => Arc::new(DirectoryBackend::open(path)?),
    };
    info!(kind = backend.kind(), "backend opened");
    Ok(backend)
}

// ═══════════════════════════════════════════════════════════════════════
//  Memory
// ═══════════════════════════════════════════════════════════════════════

/// In-process backend. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write` fail, as a full quota would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn read(&self, slot: &str) -> StoreResult<Option<String>> {
        Ok(self.slots.lock()?.get(slot).cloned())
    }

    fn write(&self, slot: &str, text: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "memory backend refused write to `{slot}`"
            )));
        }
        self.slots.lock()?.insert(slot.to_string(), text.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> StoreResult<bool> {
        Ok(self.slots.lock()?.remove(slot).is_some())
    }

    fn list_slots(&self) -> StoreResult<Vec<String>> {
        Ok(self.slots.lock()?.keys().cloned().collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Directory
// ═══════════════════════════════════════════════════════════════════════

const SLOT_SUFFIX: &str = ".json";

/// One JSON file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Open (or create) the directory at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!(path = %root.display(), "opening directory backend");
        Ok(Self { root })
    }

    /// Directory holding the slot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, slot: &str) -> StoreResult<PathBuf> {
        validate_slot_name(slot)?;
        Ok(self.root.join(format!("{slot}{SLOT_SUFFIX}")))
    }
}

/// Slot names become file names, so they must stay inside the directory.
fn validate_slot_name(slot: &str) -> StoreResult<()> {
    let bad = slot.is_empty()
        || slot.starts_with('.')
        || slot.contains(['/', '\\', '\0'])
        || slot.contains("..");
    if bad {
        return Err(StoreError::InvalidSlotName(slot.to_string()));
    }
    Ok(())
}

impl Backend for DirectoryBackend {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn read(&self, slot: &str) -> StoreResult<Option<String>> {
        let path = self.slot_path(slot)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, slot: &str, text: &str) -> StoreResult<()> {
        let path = self.slot_path(slot)?;
        // Write beside the target then rename so readers never see a torn file.
        let tmp = self.root.join(format!(".{slot}{SLOT_SUFFIX}.tmp"));
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        debug!(slot, bytes = text.len(), "slot file written");
        Ok(())
    }

    fn remove(&self, slot: &str) -> StoreResult<bool> {
        let path = self.slot_path(slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_slots(&self) -> StoreResult<Vec<String>> {
        let mut slots = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if let Some(slot) = name.strip_suffix(SLOT_SUFFIX) {
                slots.push(slot.to_string());
            }
        }
        slots.sort();
        Ok(slots)
    }

    fn modified_at(&self, slot: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let path = self.slot_path(slot)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified()?.into())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(backend: &dyn Backend) {
        assert_eq!(backend.read("users").unwrap(), None);

        backend.write("users", "[]").unwrap();
        backend.write("settings", r#"[["a",1]]"#).unwrap();
        assert_eq!(backend.read("users").unwrap().as_deref(), Some("[]"));

        backend.write("users", r#"[["u1",{}]]"#).unwrap();
        assert_eq!(
            backend.read("users").unwrap().as_deref(),
            Some(r#"[["u1",{}]]"#)
        );

        let mut slots = backend.list_slots().unwrap();
        slots.sort();
        assert_eq!(slots, ["settings", "users"]);

        assert!(backend.remove("users").unwrap());
        assert!(!backend.remove("users").unwrap());
        assert_eq!(backend.read("users").unwrap(), None);
    }

    #[test]
    fn memory_backend_contract() {
        exercise(&MemoryBackend::new());
    }

    #[test]
    fn directory_backend_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&DirectoryBackend::open(dir.path()).unwrap());
    }

    #[test]
    fn memory_backend_write_failure() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let err = backend.write("users", "[]").unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        backend.set_fail_writes(false);
        backend.write("users", "[]").unwrap();
    }

    #[test]
    fn directory_rejects_escaping_slot_names() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::open(dir.path()).unwrap();
        for bad in ["", "../etc", "a/b", ".hidden", "a\\b"] {
            assert!(
                matches!(backend.write(bad, "[]"), Err(StoreError::InvalidSlotName(_))),
                "slot name {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn directory_ignores_temp_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::open(dir.path()).unwrap();
        backend.write("keep", "[]").unwrap();
        fs::write(dir.path().join(".keep.json.tmp"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        assert_eq!(backend.list_slots().unwrap(), ["keep"]);
    }

    #[test]
    fn modification_times() {
        assert_eq!(MemoryBackend::new().modified_at("users").unwrap(), None);

        let dir = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::open(dir.path()).unwrap();
        assert_eq!(backend.modified_at("users").unwrap(), None);

        let before = Utc::now() - chrono::Duration::seconds(5);
        backend.write("users", "[]").unwrap();
        let stamp = backend.modified_at("users").unwrap().unwrap();
        assert!(stamp >= before);
    }

    #[test]
    fn open_backend_from_config() {
        let backend = open_backend(&BackendConfig::Memory).unwrap();
        assert_eq!(backend.kind(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(&BackendConfig::Directory {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(backend.kind(), "directory");
    }
}
