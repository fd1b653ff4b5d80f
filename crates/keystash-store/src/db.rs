//! SQLite slot backend with WAL mode, mmap, and performance pragmas.
//!
//! [`SqliteBackend`] wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>`. Slot reads and writes are single-row statements, so the
//! backend stays synchronous like every other [`Backend`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::migration;

/// Thread-safe handle to a SQLite database holding one row per slot.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a database at `path`, apply pragmas, and migrate.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (used by tests).
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        Self::apply_pragmas(&conn)?;
        migration::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ── pragmas ──────────────────────────────────────────────────────

    /// Apply all performance pragmas to a fresh connection.
    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite performance pragmas");

        // WAL mode: concurrent readers, non-blocking writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL; we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        // 64 MiB memory-mapped I/O; slots are small and read often.
        conn.pragma_update(None, "mmap_size", 67_108_864_i64)?;

        conn.pragma_update(None, "temp_store", "MEMORY")?;

        // Busy timeout so concurrent writers wait instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        info!("database pragmas applied (WAL, mmap 64MiB)");
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, slot: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM slots WHERE name = ?1",
                rusqlite::params![slot],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, slot: &str, text: &str) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO slots (name, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![slot, text, now],
        )?;
        debug!(slot, bytes = text.len(), "slot row written");
        Ok(())
    }

    fn remove(&self, slot: &str) -> StoreResult<bool> {
        let conn = self.conn.lock()?;
        let deleted = conn.execute("DELETE FROM slots WHERE name = ?1", rusqlite::params![slot])?;
        Ok(deleted > 0)
    }

    fn list_slots(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM slots ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn modified_at(&self, slot: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock()?;
        let millis: Option<i64> = conn
            .query_row(
                "SELECT updated_at FROM slots WHERE name = ?1",
                rusqlite::params![slot],
                |row| row.get(0),
            )
            .optional()?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

// ── tests ────────────────────────────────────────────────────────────
