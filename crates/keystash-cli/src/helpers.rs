//! Shared helpers for the keystash binary.

use anyhow::{Result, bail};
use keystash_store::Criteria;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Build search criteria from `field=value` arguments.
pub fn parse_criteria(pairs: &[String]) -> Result<Criteria> {
    let mut criteria = Criteria::new();
    for pair in pairs {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("criterion '{pair}' is not in field=value form");
        };
        if field.is_empty() {
            bail!("criterion '{pair}' has an empty field name");
        }
        criteria.insert(field.to_string(), parse_value(value));
    }
    Ok(criteria)
}
