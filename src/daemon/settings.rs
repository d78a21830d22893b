//! Default settings and version migration.
//!
//! The coordinator never interprets these keys; it only makes sure a fresh
//! store holds the values every surface expects to find.

use serde_json::{json, Value};
use tracing::{info, warn};

use super::store::{KeyValueStore, StoreError, STATE_KEY};

/// Key stamped with the crate version after migration.
pub const VERSION_KEY: &str = "version";

/// Settings written when absent from the store.
pub fn defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("theme", json!("auto")),
        ("dotShape", json!("square")),
        ("dotSize", json!(3)),
        ("colorIntensity", json!(3)),
        ("showQuotes", json!("daily")),
        ("showTasks", json!("true")),
        ("tasks", json!([])),
        ("currentQuote", Value::Null),
        ("quoteLastUpdated", json!(0)),
    ]
}

/// Returns true for keys surfaces may write through `setSetting`.
///
/// The timer record is only writable through timer commands.
pub fn is_writable(key: &str) -> bool {
    !key.is_empty() && key != STATE_KEY
}

/// Fills missing settings with defaults and stamps the running version.
///
/// Returns the number of keys written. A write failure on one key is logged
/// and does not stop the others.
///
/// # Errors
///
/// Returns an error only if the store cannot be read at all.
pub fn migrate(store: &dyn KeyValueStore, version: &str) -> Result<usize, StoreError> {
    let existing = store.snapshot()?;
    let mut written = 0;

    for (key, value) in defaults() {
        if existing.contains_key(key) {
            continue;
        }
        match store.set(key, value) {
            Ok(()) => written += 1,
            Err(e) => warn!("Failed to write default setting {}: {}", key, e),
        }
    }

    let stamped = existing.get(VERSION_KEY).and_then(Value::as_str);
    if stamped != Some(version) {
        info!(
            "Migrating settings from {} to {}",
            stamped.unwrap_or("unversioned"),
            version
        );
        match store.set(VERSION_KEY, json!(version)) {
            Ok(()) => written += 1,
            Err(e) => warn!("Failed to stamp settings version: {}", e),
        }
    }

    Ok(written)
}

// ============================================================================
// Tests
// ============================================================================
