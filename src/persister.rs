//! Persister trait and storage backends.
//!
//! A persister is an external key/value store a request can opt into: the
//! orchestrator reads it before the remote call (for lazy-load prefill) and
//! writes every fresh result back to it. Persister errors flow through the
//! same failure path as remote-call errors.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key/value store for persisted request results.
pub trait DataPersister: Send + Sync {
  /// Read the persisted value for a request key, if any.
  fn get_item(&self, key: &str) -> Result<Option<Value>>;

  /// Write a value for a request key, replacing any previous value.
  fn set_item(&self, key: &str, value: &Value) -> Result<()>;

  /// Remove the persisted value for a request key.
  fn remove_item(&self, key: &str) -> Result<()>;
}

/// Persister that stores nothing.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopPersister;

impl DataPersister for NoopPersister {
  fn get_item(&self, _key: &str) -> Result<Option<Value>> {
    Ok(None) // Always miss
  }

  fn set_item(&self, _key: &str, _value: &Value) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_item(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// In-memory persister. Survives across loads within one process, useful
/// for tests and for processes that only want lazy-load prefill semantics.
#[derive(Default)]
pub struct MemoryPersister {
  items: Mutex<HashMap<String, Value>>,
}

impl MemoryPersister {
  pub fn new() -> Self {
    Self::default()
  }
}

impl DataPersister for MemoryPersister {
  fn get_item(&self, key: &str) -> Result<Option<Value>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &Value) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.insert(key.to_string(), value.clone());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.remove(key);
    Ok(())
  }
}

/// SQLite-backed persister storing values as JSON text.
pub struct SqlitePersister {
  conn: Mutex<Connection>,
}

impl SqlitePersister {
  /// Open (or create) a persister database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create persister directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open persister database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a persister at the default location in the platform data dir.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open an in-memory persister. Mainly useful for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory persister: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let persister = Self {
      conn: Mutex::new(conn),
    };
    persister.run_migrations()?;
    Ok(persister)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("dataloader").join("persisted.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(PERSISTER_SCHEMA)
      .map_err(|e| eyre!("Failed to run persister migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the persisted-value table.
const PERSISTER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS persisted_data (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    persisted_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl DataPersister for SqlitePersister {
  fn get_item(&self, key: &str) -> Result<Option<Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT value FROM persisted_data WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare persister query: {}", e))?;

    let raw: Option<String> = stmt
      .query_row(params![key], |row| row.get(0))
      .optional()
      .map_err(|e| eyre!("Failed to read persisted value: {}", e))?;

    match raw {
      Some(text) => {
        let value = serde_json::from_str(&text)
          .map_err(|e| eyre!("Failed to deserialize persisted value: {}", e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn set_item(&self, key: &str, value: &Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let text =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO persisted_data (key, value, persisted_at)
         VALUES (?, ?, datetime('now'))",
        params![key, text],
      )
      .map_err(|e| eyre!("Failed to persist value: {}", e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM persisted_data WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove persisted value: {}", e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn memory_persister_round_trips() {
    let persister = MemoryPersister::new();
    assert_eq!(persister.get_item("users/default").unwrap(), None);

    persister.set_item("users/default", &json!({"id": 1})).unwrap();
    assert_eq!(
      persister.get_item("users/default").unwrap(),
      Some(json!({"id": 1}))
    );

    persister.remove_item("users/default").unwrap();
    assert_eq!(persister.get_item("users/default").unwrap(), None);
  }

  #[test]
  fn sqlite_persister_round_trips() {
    let persister = SqlitePersister::open_in_memory().unwrap();

    persister.set_item("users/default", &json!([1, 2, 3])).unwrap();
    assert_eq!(
      persister.get_item("users/default").unwrap(),
      Some(json!([1, 2, 3]))
    );

    // overwrite
    persister.set_item("users/default", &json!([4])).unwrap();
    assert_eq!(persister.get_item("users/default").unwrap(), Some(json!([4])));

    persister.remove_item("users/default").unwrap();
    assert_eq!(persister.get_item("users/default").unwrap(), None);
  }

  #[test]
  fn sqlite_read_errors_surface_instead_of_missing() {
    let path = std::env::temp_dir().join(format!(
      "dataloader-persister-test-{}.db",
      std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    let persister = SqlitePersister::open(&path).unwrap();
    persister.set_item("users/default", &json!(1)).unwrap();

    // Sabotage the row through a second connection: a BLOB where JSON
    // text is expected makes the read fail rather than return no rows.
    // (A blob is stored as-is regardless of the column's TEXT affinity.)
    let conn = Connection::open(&path).unwrap();
    conn
      .execute(
        "INSERT OR REPLACE INTO persisted_data (key, value, persisted_at)
         VALUES ('users/default', X'00', datetime('now'))",
        [],
      )
      .unwrap();
    drop(conn);

    assert!(persister.get_item("users/default").is_err());
    assert_eq!(persister.get_item("missing").unwrap(), None);

    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn noop_persister_always_misses() {
    let persister = NoopPersister;
    persister.set_item("k", &json!(1)).unwrap();
    assert_eq!(persister.get_item("k").unwrap(), None);
  }
}
