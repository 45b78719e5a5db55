//! Caller-facing binding: current status plus a trigger function for one
//! request, bundled for UI or external code.

use color_eyre::Result;
use serde_json::Value;
use tokio::sync::watch;

use crate::descriptor::Descriptor;
use crate::loader::DataLoader;
use crate::status::{StatusRecord, StatusTable};

/// Handle tying one descriptor to a loader.
pub struct Binding {
  loader: DataLoader,
  descriptor: Descriptor,
}

impl DataLoader {
  /// Bind a descriptor to this loader. When the descriptor's `auto_load` is
  /// set (the default) this triggers a load immediately; otherwise it only
  /// seeds the status record.
  pub fn bind(&self, descriptor: Descriptor) -> Result<Binding> {
    if descriptor.auto_load {
      self.load(&descriptor)?;
    } else {
      self.init(&descriptor)?;
    }
    Ok(Binding {
      loader: self.clone(),
      descriptor,
    })
  }
}

impl Binding {
  /// Current status record for the bound request, default-filled.
  pub fn status(&self) -> StatusRecord {
    self.loader.status_of(&self.descriptor)
  }

  /// Re-trigger the bound request.
  pub fn load(&self) -> Result<()> {
    self.loader.load(&self.descriptor)
  }

  /// Re-trigger with different params. Same request name, so a running
  /// task for this name is superseded.
  pub fn load_with(&self, params: Value) -> Result<()> {
    let descriptor = self.descriptor.clone().with_params(params);
    self.loader.load(&descriptor)
  }

  /// Subscribe to status-table changes.
  pub fn changes(&self) -> watch::Receiver<StatusTable> {
    self.loader.subscribe()
  }

  /// The bound request's resolved cache-slot key.
  pub fn key(&self) -> String {
    self.descriptor.key()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn counting(name: &str, calls: Arc<AtomicU32>) -> Descriptor {
    Descriptor::new(name, move |params| {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(params.unwrap_or(json!(null)))
      }
    })
  }

  #[tokio::test]
  async fn bind_with_auto_load_fetches_immediately() {
    let loader = DataLoader::new();
    let calls = Arc::new(AtomicU32::new(0));
    let binding = loader.bind(counting("users", calls.clone())).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!binding.status().loading);
  }

  #[tokio::test]
  async fn bind_without_auto_load_only_seeds() {
    let loader = DataLoader::new();
    let calls = Arc::new(AtomicU32::new(0));
    let binding = loader
      .bind(counting("users", calls.clone()).auto_load(false))
      .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let record = binding.status();
    assert!(!record.loading);
    assert_eq!(record.data, None);

    binding.load().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn load_with_overrides_params() {
    let loader = DataLoader::new();
    let calls = Arc::new(AtomicU32::new(0));
    let binding = loader
      .bind(
        counting("users", calls.clone())
          .auto_load(false)
          .with_data_key(crate::key::query_string_key),
      )
      .unwrap();

    binding.load_with(json!({"page": 3})).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let record = loader.status("users/page=3");
    assert_eq!(record.data, Some(json!({"page": 3})));
  }
}
