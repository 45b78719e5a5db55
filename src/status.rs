//! Status table and its transition functions.
//!
//! One [`StatusRecord`] per request key, held in a shared [`StatusTable`]
//! snapshot. Transitions are pure functions: they build a new table with a
//! new record for the affected key and leave the previous snapshot intact,
//! so observers holding an old snapshot are never affected by later
//! mutations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Current data/loading/error snapshot for one request key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusRecord {
  /// Last successfully loaded value, kept across failed refreshes.
  pub data: Option<Value>,
  /// True while a fetch cycle is in flight for this key.
  pub loading: bool,
  /// Error from the most recent failed cycle, cleared on success.
  pub error: Option<String>,
  /// When `data` was last set.
  pub last_update_time: Option<DateTime<Utc>>,
  /// When `error` was last set.
  pub last_error_time: Option<DateTime<Utc>>,
}

/// Immutable snapshot mapping request keys to their status records.
pub type StatusTable = Arc<HashMap<String, StatusRecord>>;

/// Build a new table with the record for `key` replaced. Unseen keys start
/// from the default record.
fn update(table: &StatusTable, key: &str, patch: impl FnOnce(&mut StatusRecord)) -> StatusTable {
  let mut next: HashMap<String, StatusRecord> = table.as_ref().clone();
  let mut record = next.get(key).cloned().unwrap_or_default();
  patch(&mut record);
  next.insert(key.to_string(), record);
  Arc::new(next)
}

/// Seed an empty record for `key` if one is not already present.
pub fn init(table: &StatusTable, key: &str) -> StatusTable {
  if table.contains_key(key) {
    return Arc::clone(table);
  }
  update(table, key, |_| {})
}

/// Mark a fetch cycle as started. Existing `data` and `error` stay visible
/// while the new cycle is in flight.
pub fn start(table: &StatusTable, key: &str) -> StatusTable {
  update(table, key, |record| {
    record.loading = true;
  })
}

/// Record a successful load. `is_fresh` distinguishes the final result of a
/// cycle (clears `loading`) from an intermediate lazy-load prefill out of a
/// persister (leaves `loading` set until the live result arrives).
pub fn load_success(table: &StatusTable, key: &str, data: Value, is_fresh: bool) -> StatusTable {
  update(table, key, |record| {
    record.data = Some(data);
    record.error = None;
    record.last_update_time = Some(Utc::now());
    if is_fresh {
      record.loading = false;
    }
  })
}

/// Record a failed load. Existing `data` is deliberately kept, so a failed
/// refresh never flickers a consumer back to the empty state.
pub fn load_failure(table: &StatusTable, key: &str, error: impl Into<String>) -> StatusTable {
  update(table, key, |record| {
    record.error = Some(error.into());
    record.loading = false;
    record.last_error_time = Some(Utc::now());
  })
}
