//! CLI argument definitions for keystash.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// keystash -- persisted key-value slots from the command line.
#[derive(Debug, Parser)]
#[command(
    name = "keystash",
    version,
    about = "keystash -- persisted key-value slots",
    long_about = "Inspect and edit keystash slots, search and sort their records, \
                  and produce or restore backups of the essential slots."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/keystash.toml")]
    pub config: PathBuf,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print one record, or the whole slot.
    Get {
        slot: String,
        key: Option<String>,
    },

    /// Store a record (the value is JSON; bare words are taken as strings).
    Set {
        slot: String,
        key: String,
        value: String,
    },

    /// Remove one or more records.
    Delete {
        slot: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Search a slot by field criteria.
    Search {
        slot: String,

        /// Criterion in `field=value` form. Repeatable.
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        criteria: Vec<String>,

        /// Compare whole values instead of substrings.
        #[arg(long)]
        exact: bool,

        /// Match records satisfying any criterion instead of all of them.
        #[arg(long)]
        any: bool,

        /// Compare strings case-sensitively.
        #[arg(long)]
        case_sensitive: bool,

        /// Keep at most this many results (0 keeps all).
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Print a slot in sorted order.
    Sort {
        slot: String,

        /// Field to sort by. Without it the current order is used.
        #[arg(long)]
        by: Option<String>,

        /// Reverse the order.
        #[arg(long)]
        reverse: bool,

        /// Write the sorted order back to the slot.
        #[arg(long)]
        persist: bool,
    },

    /// Read or change one module key of a module record.
    Module {
        slot: String,
        entry: String,
        module: String,

        /// New value as JSON. Without it the current value is printed.
        value: Option<String>,

        /// Replace object values instead of merging them.
        #[arg(long = "override")]
        override_existing: bool,

        /// Remove the module key.
        #[arg(long, conflicts_with = "value")]
        delete: bool,

        /// Remove the whole entry.
        #[arg(long, conflicts_with_all = ["value", "delete"])]
        clear_entry: bool,
    },

    /// Write a backup of the essential slots.
    Backup {
        /// Directory the backup file is written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Backup filename. Defaults to `<host>-backup-<timestamp>.json`.
        #[arg(long)]
        filename: Option<String>,

        /// Stamp the backup time into the live stores once the file is written.
        #[arg(long)]
        commit: bool,
    },

    /// Restore a backup file.
    Restore {
        file: PathBuf,

        /// Name the backup was produced under, if the file was renamed.
        #[arg(long)]
        filename: Option<String>,
    },

    /// List stored slots with their last write time.
    Slots,

    /// Remove every slot that is not essential.
    ClearCache,
}
