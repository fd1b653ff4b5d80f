//! Subcommand implementations.
//!
//! Each command runs against a [`StoreRegistry`] and returns the JSON value
//! to print, so `main.rs` only formats output.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use keystash_store::{Backup, ModuleOp, SearchOptions, StoreRegistry, rw};
use serde_json::{Value, json};
use tracing::info;

use crate::cli::Commands;
use crate::helpers::{parse_criteria, parse_value};

/// Run one subcommand.
pub async fn execute(registry: &StoreRegistry, command: Commands) -> Result<Value> {
    match command {
        Commands::Get { slot, key } => {
            let store = registry.store(&slot)?;
            match key {
                Some(key) => Ok(store.get(&key)?.unwrap_or(Value::Null)),
                None => Ok(store.get_all()?.to_json()),
            }
        }

        Commands::Set { slot, key, value } => {
            registry.store(&slot)?.set(key.as_str(), parse_value(&value))?;
            Ok(json!({ "slot": slot, "set": key }))
        }

        Commands::Delete { slot, keys } => {
            let store = registry.store(&slot)?;
            let before = store.len();
            store.delete(keys)?;
            Ok(json!({ "slot": slot, "deleted": before - store.len() }))
        }

        Commands::Search {
            slot,
            criteria,
            exact,
            any,
            case_sensitive,
            limit,
        } => {
            let criteria = parse_criteria(&criteria)?;
            let opts = SearchOptions::new()
                .exact(exact)
                .all(!any)
                .ignore_case(!case_sensitive);
            let hits = registry.store(&slot)?.search(&criteria, opts, limit)?;
            Ok(hits.to_json())
        }

        Commands::Sort {
            slot,
            by,
            reverse,
            persist,
        } => {
            let sorted = registry.store(&slot)?.sort(by.as_deref(), reverse, persist)?;
            Ok(sorted.to_json())
        }

        Commands::Module {
            slot,
            entry,
            module,
            value,
            override_existing,
            delete,
            clear_entry,
        } => {
            let op = if clear_entry {
                ModuleOp::ClearEntry
            } else if delete {
                ModuleOp::Delete
            } else {
                match value {
                    Some(raw) => ModuleOp::from_value(parse_value(&raw), override_existing),
                    None => ModuleOp::Read,
                }
            };
            let store = registry.store(&slot)?;
            Ok(rw(&store, &entry, &module, op)?.unwrap_or(Value::Null))
        }

        Commands::Backup {
            out,
            filename,
            commit,
        } => backup(registry, &out, filename.as_deref(), commit).await,

        Commands::Restore { file, filename } => restore(registry, &file, filename.as_deref()),

        Commands::Slots => {
            let backend = registry.backend();
            let mut slots = Vec::new();
            for name in backend.list_slots()? {
                let modified = backend
                    .modified_at(&name)?
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));
                slots.push(json!({
                    "name": name,
                    "essential": registry.is_essential(&name),
                    "modified": modified,
                }));
            }
            Ok(Value::Array(slots))
        }

        Commands::ClearCache => {
            let removed = registry.clear_non_essential()?;
            Ok(json!({ "removed": removed }))
        }
    }
}

// ---------------------------------------------------------------------------
// Backup and restore
// ---------------------------------------------------------------------------

async fn backup(
    registry: &StoreRegistry,
    out: &Path,
    filename: Option<&str>,
    commit: bool,
) -> Result<Value> {
    let backup = Backup::new(registry.clone());
    let artifact = backup.download(filename).await?;

    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    let path = out.join(&artifact.filename);
    std::fs::write(&path, &artifact.content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "backup written");

    // Only stamp the live stores once the file is safely on disk.
    if commit {
        backup.commit(&artifact).context("failed to commit backup timestamp")?;
    }

    Ok(json!({
        "timestamp": artifact.timestamp,
        "filename": artifact.filename,
        "hash": artifact.hash,
        "path": path.display().to_string(),
        "committed": commit,
    }))
}

fn restore(registry: &StoreRegistry, file: &Path, filename: Option<&str>) -> Result<Value> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = match filename {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("{} has no usable file name", file.display()))?,
    };

    let restored = Backup::new(registry.clone())
        .restore(&text, &name)
        .with_context(|| format!("failed to restore {name}"))?;
    Ok(json!({ "restored": restored }))
}
