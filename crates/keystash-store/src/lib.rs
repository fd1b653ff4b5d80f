//! # keystash-store
//!
//! Persisted, ordered key-value slots with coalesced change notification,
//! multi-field search, module-record helpers, and portable backups.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Backup (generate / download / commit /      │
//! │          restore, SHA-256 identity)          │
//! ├─────────────────────────────────────────────┤
//! │  StoreRegistry (one Store per slot, DashMap) │
//! │  Store  ── query::search / query::sort       │
//! │         ── rw (module records)               │
//! │         ── ChangeNotifier (watch, debounced) │
//! ├─────────────────────────────────────────────┤
//! │  Backend: Memory │ SQLite (WAL) │ Directory  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use keystash_store::{StoreConfig, StoreRegistry, SearchOptions};
//! use serde_json::json;
//!
//! let registry = StoreRegistry::open(StoreConfig::load("config/keystash.toml")?)?;
//! let users = registry.store("users")?;
//! users.set("u1", json!({"name": "Ann"}))?.set("u2", json!({"name": "Bob"}))?;
//!
//! let criteria = json!({"name": "an"}).as_object().cloned().unwrap_or_default();
//! let hits = users.search(&criteria, SearchOptions::new(), 0)?;
//! ```

pub mod backend;
pub mod backup;
pub mod config;
pub mod db;
pub mod entries;
pub mod error;
pub mod hash;
pub mod migration;
pub mod notifier;
pub mod query;
pub mod registry;
pub mod rw;
pub mod store;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{Backend, DirectoryBackend, MemoryBackend, open_backend};
pub use backup::{
    Backup, BackupArtifact, BackupDocument, BackupPayload, FILE_BACKUP_TS, filename_to_ts,
};
pub use config::{BackendConfig, BackupConfig, StoreConfig, TimestampTarget};
pub use db::SqliteBackend;
pub use entries::Entries;
pub use error::{StoreError, StoreResult};
pub use hash::{ContentHasher, Sha256Hasher};
pub use notifier::{ChangeNotifier, DEFAULT_DEBOUNCE};
pub use query::{Criteria, SearchOptions};
pub use registry::StoreRegistry;
pub use rw::{ModuleOp, rw};
pub use store::{KeyList, Store, StoreBuilder};
