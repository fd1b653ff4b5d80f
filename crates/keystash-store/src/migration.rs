//! Versioned schema for the SQLite backend.
//!
//! Each applied step is recorded in `_migrations`; [`run_all`] applies the
//! missing ones in order, each inside its own transaction, so reopening an
//! existing database is a no-op.

use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// One schema step.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Schema steps, oldest first.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "slot table",
    sql: r#"
        CREATE TABLE slots (
            name       TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
    "#,
}];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring the schema up to [`latest_version`].
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(failed(0, "create _migrations"))?;

    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::Migration {
            version: current,
            message: format!("database is newer than this build (v{})", latest_version()),
        });
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "schema up to date");
    } else {
        info!(from = current, to = latest_version(), applied, "schema migrated");
    }
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
        row.get(0)
    })
    .map_err(failed(0, "read schema version"))
}

fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let v = migration.version;
    // Dropping the transaction without commit rolls it back.
    let tx = conn.unchecked_transaction().map_err(failed(v, "begin"))?;
    tx.execute_batch(migration.sql).map_err(failed(v, "run"))?;
    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![v, migration.description, chrono::Utc::now().timestamp()],
    )
    .map_err(failed(v, "record"))?;
    tx.commit().map_err(failed(v, "commit"))?;

    info!(version = v, description = migration.description, "migration applied");
    Ok(())
}

fn failed(version: u32, step: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::Migration {
        version,
        message: format!("{step} failed: {e}"),
    }
}

// ── tests ────────────────────────────────────────────────────────────
