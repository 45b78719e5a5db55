//! The fetch orchestrator: request-lifecycle state machine, per-name task
//! registry and interval scheduler.
//!
//! A fetch cycle for one descriptor runs: check cache validity → mark
//! loading → optional persisted prefill → await the remote call → record
//! success/failure. Remote and persister errors never propagate to the
//! caller; they land in the [`StatusRecord`] and are reported through the
//! descriptor's `on_failure` callback.
//!
//! Cancellation is cooperative: tasks are cancelled at their suspension
//! points (the remote-call await, the interval timer), and every status
//! mutation happens synchronously between suspension points, so a cancelled
//! run can never emit a late mutation from its pending remote call.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use color_eyre::Result;

use crate::descriptor::Descriptor;
use crate::status::{self, StatusRecord, StatusTable};
use crate::validity::is_valid;

/// Coordinates named, parameterized data-loading requests.
///
/// Holds the shared [`StatusTable`] and the registry of running tasks.
/// Cloning is cheap and clones share the same state, so a loader can be
/// handed to any number of call sites.
#[derive(Clone)]
pub struct DataLoader {
  shared: Arc<Shared>,
}

struct Shared {
  /// Current table snapshot; sending doubles as observer notification.
  table: watch::Sender<StatusTable>,
  /// At most one live task per request name.
  tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Shared {
  fn apply(&self, transition: impl FnOnce(&StatusTable) -> StatusTable) {
    self.table.send_modify(|table| {
      *table = transition(table);
    });
  }

  fn snapshot(&self) -> StatusTable {
    self.table.borrow().clone()
  }
}

impl DataLoader {
  pub fn new() -> Self {
    let (table, _) = watch::channel(Arc::new(HashMap::new()));
    Self {
      shared: Arc::new(Shared {
        table,
        tasks: Mutex::new(HashMap::new()),
      }),
    }
  }

  /// Seed an empty status record for the descriptor's key, without
  /// fetching. Existing records are left untouched.
  pub fn init(&self, descriptor: &Descriptor) -> Result<()> {
    descriptor.validate()?;
    let key = descriptor.key();
    self.shared.apply(|table| status::init(table, &key));
    Ok(())
  }

  /// Trigger a fetch for the descriptor: one cycle when `interval` is zero,
  /// a polling loop otherwise.
  ///
  /// The task is registered under the request name; any still-running task
  /// for that name is cancelled first, so rapid re-triggers never stack
  /// overlapping loops. A cache-valid entry makes the cycle return without
  /// a remote call. Returns `Err` only for configuration errors.
  pub fn load(&self, descriptor: &Descriptor) -> Result<()> {
    descriptor.validate()?;

    let shared = Arc::clone(&self.shared);
    let desc = descriptor.clone();

    let mut tasks = self
      .shared
      .tasks
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(previous) = tasks.remove(descriptor.name()) {
      previous.abort();
      debug!(name = descriptor.name(), "superseding running load task");
    }

    let task = if desc.interval.is_zero() {
      tokio::spawn(async move {
        run_cycle(&shared, &desc).await;
      })
    } else {
      tokio::spawn(async move {
        run_in_interval(&shared, &desc).await;
      })
    };
    tasks.insert(descriptor.name().to_string(), task);

    Ok(())
  }

  /// Cancel the running task for a request name, if any. This is how a
  /// caller explicitly stops a polling loop.
  pub fn stop(&self, name: &str) {
    let mut tasks = self
      .shared
      .tasks
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(task) = tasks.remove(name) {
      task.abort();
      debug!(name, "stopped load task");
    }
  }

  /// Current status record for a request key, default-filled for keys
  /// never seen.
  pub fn status(&self, key: &str) -> StatusRecord {
    self
      .shared
      .table
      .borrow()
      .get(key)
      .cloned()
      .unwrap_or_default()
  }

  /// Current status record for a descriptor's resolved key.
  pub fn status_of(&self, descriptor: &Descriptor) -> StatusRecord {
    self.status(&descriptor.key())
  }

  /// Subscribe to status-table changes. Each received value is an
  /// immutable snapshot; later mutations never affect it.
  pub fn subscribe(&self) -> watch::Receiver<StatusTable> {
    self.shared.table.subscribe()
  }
}

impl Default for DataLoader {
  fn default() -> Self {
    Self::new()
  }
}

/// Run one fetch cycle. Returns the loaded (or cache-valid) data, or `None`
/// when the cycle failed.
async fn run_cycle(shared: &Shared, desc: &Descriptor) -> Option<Value> {
  let key = desc.key();

  let current = shared.snapshot();
  let record = current.get(&key);
  if is_valid(record, desc.ttl) {
    debug!(%key, "cache valid, skipping remote call");
    return record.and_then(|r| r.data.clone());
  }

  shared.apply(|table| status::start(table, &key));

  if let Some(persister) = &desc.persister {
    match persister.get_item(&key) {
      Ok(Some(persisted)) if desc.lazy_load => {
        // Surface the persisted value immediately; loading stays set until
        // the live result lands.
        shared.apply(|table| status::load_success(table, &key, persisted.clone(), false));
        if let Some(on_success) = &desc.on_success {
          on_success(&persisted);
        }
      }
      Ok(_) => {}
      Err(error) => return fail(shared, desc, &key, error.to_string()),
    }
  }

  match (desc.fetch)(desc.params.clone()).await {
    Ok(data) => {
      shared.apply(|table| status::load_success(table, &key, data.clone(), true));
      if let Some(on_success) = &desc.on_success {
        on_success(&data);
      }
      if let Some(persister) = &desc.persister {
        if let Err(error) = persister.set_item(&key, &data) {
          return fail(shared, desc, &key, error.to_string());
        }
      }
      Some(data)
    }
    Err(error) => fail(shared, desc, &key, error.to_string()),
  }
}

fn fail(shared: &Shared, desc: &Descriptor, key: &str, message: String) -> Option<Value> {
  warn!(key, error = %message, "load failed");
  shared.apply(|table| status::load_failure(table, key, message.clone()));
  if let Some(on_failure) = &desc.on_failure {
    on_failure(&message);
  }
  None
}

/// Repeat fetch cycles on a fixed delay until the continuation predicate
/// declines. A cycle still running when the delay elapses is cancelled at
/// its suspension point and contributes no result.
async fn run_in_interval(shared: &Shared, desc: &Descriptor) {
  loop {
    let cycle = run_cycle(shared, desc);
    tokio::pin!(cycle);
    let wait = tokio::time::sleep(desc.interval);
    tokio::pin!(wait);

    let last = tokio::select! {
      result = &mut cycle => {
        // cycle finished first: wait out the rest of the interval
        wait.as_mut().await;
        result
      }
      _ = &mut wait => {
        debug!(name = desc.name(), "cancelling fetch cycle still running after interval");
        None
      }
    };

    if !(desc.should_continue)(last.as_ref()) {
      break;
    }
  }
}
