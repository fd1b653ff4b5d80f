//! Backup and restore of the essential slots.
//!
//! A backup is one JSON document whose top-level keys are the essential slot
//! names, each holding that slot's parsed contents (normally the persisted
//! `[key, value]` pair list), plus a reserved identity field holding the hash
//! of the filename the backup was produced under.
//!
//! The lifecycle is `generate -> download -> (caller confirms the file was
//! written) -> commit`. Committing stamps `fileBackupTS` into the live
//! timestamped stores; it is never done as part of producing the file.
//!
//! Filenames follow `<host>-backup-<RFC 3339 millis>.json`, with `localhost`
//! replaced by [`BackupConfig::localhost_label`].

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::{BackupConfig, TimestampTarget};
use crate::entries::Entries;
use crate::error::{StoreError, StoreResult};
use crate::hash::{ContentHasher, Sha256Hasher};
use crate::registry::StoreRegistry;

/// Per-record field updated on every committed backup.
pub const FILE_BACKUP_TS: &str = "fileBackupTS";

const FILENAME_MARKER: &str = "backup-";
const FILENAME_SUFFIX: &str = ".json";

/// Top-level backup document.
pub type BackupDocument = Map<String, Value>;

/// What a data modifier hands back: still structured, or already text
/// (for example after encryption).
#[derive(Debug, Clone, PartialEq)]
pub enum BackupPayload {
    Document(BackupDocument),
    Text(String),
}

/// A produced backup, ready to be written by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub filename: String,
    /// Timestamp embedded in the filename.
    pub timestamp: String,
    /// Final file contents.
    pub content: String,
    /// Hash of `content`.
    pub hash: String,
}

/// Backup producer and restorer over a [`StoreRegistry`].
#[derive(Clone)]
pub struct Backup {
    registry: StoreRegistry,
    hasher: Arc<dyn ContentHasher>,
}

impl Backup {
    /// Backup service using SHA-256 content hashes.
    pub fn new(registry: StoreRegistry) -> Self {
        Self::with_hasher(registry, Arc::new(Sha256Hasher))
    }

    pub fn with_hasher(registry: StoreRegistry, hasher: Arc<dyn ContentHasher>) -> Self {
        Self { registry, hasher }
    }

    fn config(&self) -> &BackupConfig {
        &self.registry.config().backup
    }

    /// Filename for a backup taken at `at`.
    pub fn default_filename(&self, at: DateTime<Utc>) -> String {
        let cfg = self.config();
        let host = if cfg.hostname == "localhost" {
            cfg.localhost_label.as_str()
        } else {
            cfg.hostname.as_str()
        };
        format!(
            "{host}-{FILENAME_MARKER}{}{FILENAME_SUFFIX}",
            at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    /// Identity token binding a document to `filename`.
    pub fn identity_for(&self, filename: &str) -> String {
        self.hasher.hash(filename.as_bytes())
    }

    /// Snapshot the essential slots straight off the backend.
    ///
    /// Absent or unparseable slots are left out of the document. Records in
    /// timestamped slots, and every configured timestamp target, get
    /// `fileBackupTS = timestamp`.
    #[instrument(skip(self))]
    pub fn generate_data(&self, timestamp: &str) -> StoreResult<BackupDocument> {
        let cfg = self.config();
        let backend = self.registry.backend();
        let mut doc = BackupDocument::new();

        for slot in &cfg.essential_slots {
            let Some(text) = backend.read(slot)? else {
                debug!(slot = %slot, "slot absent, left out of backup");
                continue;
            };
            let mut content: Value = match serde_json::from_str(&text) {
                Ok(content) => content,
                Err(err) => {
                    warn!(slot = %slot, %err, "slot unparseable, left out of backup");
                    continue;
                }
            };

            if cfg.timestamped_slots.contains(slot) {
                for record in records_mut(&mut content) {
                    stamp(record, timestamp);
                }
            }
            for target in cfg.timestamp_targets.iter().filter(|t| &t.slot == slot) {
                if let Some(nested) = target_in_slot(&mut content, target) {
                    stamp(nested, timestamp);
                }
            }

            doc.insert(slot.clone(), content);
        }

        info!(slots = doc.len(), "backup data generated");
        Ok(doc)
    }

    /// Produce a backup document as text.
    pub async fn download(&self, filename: Option<&str>) -> StoreResult<BackupArtifact> {
        self.download_with(filename, |doc| async move { Ok(BackupPayload::Document(doc)) })
            .await
    }

    /// Produce a backup, passing the document through `modifier` before it
    /// is serialized and hashed.
    #[instrument(skip(self, modifier))]
    pub async fn download_with<F, Fut>(
        &self,
        filename: Option<&str>,
        modifier: F,
    ) -> StoreResult<BackupArtifact>
    where
        F: FnOnce(BackupDocument) -> Fut,
        Fut: Future<Output = StoreResult<BackupPayload>>,
    {
        let filename = match filename {
            Some(name) => name.to_string(),
            None => self.default_filename(Utc::now()),
        };
        let timestamp = filename_to_ts(Some(&filename));

        let mut doc = self.generate_data(&timestamp)?;
        doc.insert(
            self.config().identity_field.clone(),
            Value::String(self.identity_for(&filename)),
        );

        let content = match modifier(doc).await? {
            BackupPayload::Document(doc) => serde_json::to_string(&doc)?,
            BackupPayload::Text(text) => text,
        };
        let hash = self.hasher.hash(content.as_bytes());

        info!(filename = %filename, bytes = content.len(), "backup produced");
        Ok(BackupArtifact {
            filename,
            timestamp,
            content,
            hash,
        })
    }

    /// Record a confirmed backup in the live stores.
    pub fn commit(&self, artifact: &BackupArtifact) -> StoreResult<()> {
        self.update_file_backup_ts(&artifact.timestamp)
    }

    /// Stamp `fileBackupTS` into every timestamped store and target.
    ///
    /// Call only once the backup file is known to be written. The timestamp
    /// is validated before any store is touched.
    #[instrument(skip(self))]
    pub fn update_file_backup_ts(&self, timestamp: &str) -> StoreResult<()> {
        validate_timestamp(timestamp)?;
        let cfg = self.config();

        for slot in &cfg.timestamped_slots {
            self.registry.store(slot)?.update_all(|entries| {
                entries
                    .values_mut()
                    .fold(false, |any, record| stamp(record, timestamp) || any)
            })?;
        }

        for target in &cfg.timestamp_targets {
            self.registry.store(&target.slot)?.update(&target.entry, |current| {
                let mut record = current.cloned()?;
                if let Some(nested) = walk_mut(&mut record, &target.path) {
                    stamp(nested, timestamp);
                }
                Some(record)
            })?;
        }

        for slot in &cfg.timestamped_slots {
            self.registry.store(slot)?.notify();
        }

        info!(timestamp, "backup timestamp committed");
        Ok(())
    }

    /// Load a backup produced as `filename` back into the stores.
    ///
    /// The document must carry the identity of `filename` and the filename
    /// must embed a valid timestamp; both are checked before anything is
    /// written. Only essential slots are restored, each replacing the live
    /// contents; a slot whose content is not a record list or object is
    /// skipped. Returns the restored slot names.
    #[instrument(skip(self, text))]
    pub fn restore(&self, text: &str, filename: &str) -> StoreResult<Vec<String>> {
        let doc: BackupDocument = serde_json::from_str(text)?;
        let cfg = self.config();

        let expected = self.identity_for(filename);
        let found = doc
            .get(&cfg.identity_field)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if found != expected {
            return Err(StoreError::IdentityMismatch {
                expected,
                found: found.to_string(),
            });
        }

        let timestamp = filename_to_ts(Some(filename));
        validate_timestamp(&timestamp)?;

        let mut restored = Vec::new();
        for slot in &cfg.essential_slots {
            let Some(content) = doc.get(slot) else {
                continue;
            };
            let Some(entries) = Entries::from_json(content) else {
                warn!(slot = %slot, "backup slot is not a record list, skipped");
                continue;
            };
            self.registry.store(slot)?.set_all(entries, true)?;
            restored.push(slot.clone());
        }
        info!(slots = restored.len(), "backup restored");

        self.update_file_backup_ts(&timestamp)?;
        Ok(restored)
    }
}

/// Timestamp embedded in a backup filename, or `""` if there is none.
///
/// The timestamp runs from the last `backup-` marker (host names may contain
/// the marker too) up to the first `.json` after it, so extra extensions
/// such as `.json.enc` are tolerated.
pub fn filename_to_ts(filename: Option<&str>) -> String {
    filename
        .and_then(|name| {
            let start = name.rfind(FILENAME_MARKER)? + FILENAME_MARKER.len();
            let rest = &name[start..];
            rest.find(FILENAME_SUFFIX).map(|end| &rest[..end])
        })
        .unwrap_or_default()
        .to_string()
}

fn validate_timestamp(timestamp: &str) -> StoreResult<()> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|_| ())
        .map_err(|_| StoreError::InvalidTimestamp(timestamp.to_string()))
}

/// Set `fileBackupTS` on an object record. Returns whether it was an object.
fn stamp(record: &mut Value, timestamp: &str) -> bool {
    match record.as_object_mut() {
        Some(fields) => {
            fields.insert(FILE_BACKUP_TS.to_string(), Value::String(timestamp.to_string()));
            true
        }
        None => false,
    }
}

/// Record values of raw slot content in either pair-list or object form.
fn records_mut(content: &mut Value) -> Vec<&mut Value> {
    match content {
        Value::Array(pairs) => pairs
            .iter_mut()
            .filter_map(|pair| match pair {
                Value::Array(kv) if kv.len() == 2 => kv.get_mut(1),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map.values_mut().collect(),
        _ => Vec::new(),
    }
}

/// Locate `target` inside raw slot content.
fn target_in_slot<'a>(content: &'a mut Value, target: &TimestampTarget) -> Option<&'a mut Value> {
    let record = match content {
        Value::Array(pairs) => pairs.iter_mut().find_map(|pair| match pair {
            Value::Array(kv) if kv.len() == 2 && kv[0].as_str() == Some(target.entry.as_str()) => {
                kv.get_mut(1)
            }
            _ => None,
        }),
        Value::Object(map) => map.get_mut(&target.entry),
        _ => None,
    }?;
    walk_mut(record, &target.path)
}

fn walk_mut<'a>(mut value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    for step in path {
        value = value.as_object_mut()?.get_mut(step)?;
    }
    Some(value)
}

// ── tests ────────────────────────────────────────────────────────────
