//! Request descriptors: the full configuration of one data-loading request.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::key::{self, default_data_key, DataKeyFn};
use crate::persister::DataPersister;

/// Factory producing the remote-call future for one fetch cycle.
pub type FetchFn = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Decides after each polling cycle whether another cycle should run.
/// Receives the last cycle's result, or `None` if the cycle was cancelled
/// or failed.
pub type ContinueFn = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Fire-and-forget success callback; the return value is ignored.
pub type SuccessFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// Fire-and-forget failure callback; the return value is ignored.
pub type FailureFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration of one data-loading request.
///
/// A descriptor is immutable per invocation and cheap to clone (all
/// function fields are shared). Construction is builder-style over
/// defaults:
///
/// ```ignore
/// let users = Descriptor::new("users", |_params| async {
///     Ok(json!([{"id": 1}]))
///   })
///   .with_ttl(Duration::from_secs(60))
///   .with_interval(Duration::from_secs(10));
/// ```
#[derive(Clone)]
pub struct Descriptor {
  pub(crate) name: String,
  pub(crate) fetch: FetchFn,
  pub(crate) params: Option<Value>,
  pub(crate) ttl: Duration,
  pub(crate) interval: Duration,
  pub(crate) should_continue: ContinueFn,
  pub(crate) lazy_load: bool,
  pub(crate) auto_load: bool,
  pub(crate) persister: Option<Arc<dyn DataPersister>>,
  pub(crate) on_success: Option<SuccessFn>,
  pub(crate) on_failure: Option<FailureFn>,
  pub(crate) data_key: DataKeyFn,
}

impl Descriptor {
  /// Create a descriptor for a named request with the given remote call.
  ///
  /// The remote call is a closure that receives the descriptor's params and
  /// returns a future. It is invoked once per fetch cycle.
  pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
  where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    Self {
      name: name.into(),
      fetch: Arc::new(move |params| Box::pin(fetch(params))),
      params: None,
      ttl: Duration::ZERO,
      interval: Duration::ZERO,
      should_continue: Arc::new(|_| true),
      lazy_load: false,
      auto_load: true,
      persister: None,
      on_success: None,
      on_failure: None,
      data_key: Arc::new(default_data_key),
    }
  }

  /// Set the params passed to the remote call and the key function.
  pub fn with_params(mut self, params: Value) -> Self {
    self.params = Some(params);
    self
  }

  /// Set the time-to-live for cached results. While a result is within its
  /// TTL, `load` short-circuits without a remote call. Zero (the default)
  /// disables caching.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Set the polling interval. Zero (the default) means a single fetch
  /// cycle per `load`.
  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  /// Set the continuation predicate evaluated after each polling cycle.
  pub fn with_should_continue<F>(mut self, should_continue: F) -> Self
  where
    F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
  {
    self.should_continue = Arc::new(should_continue);
    self
  }

  /// When true and a persister holds a value for this key, the persisted
  /// value surfaces immediately (with `loading` still set) before the
  /// remote round-trip completes.
  pub fn lazy_load(mut self, lazy_load: bool) -> Self {
    self.lazy_load = lazy_load;
    self
  }

  /// Whether `bind` triggers a load right away (default) or only seeds the
  /// status record.
  pub fn auto_load(mut self, auto_load: bool) -> Self {
    self.auto_load = auto_load;
    self
  }

  /// Attach a persister. Fresh results are written through to it, and
  /// lazy-load prefill reads from it.
  pub fn with_persister(mut self, persister: Arc<dyn DataPersister>) -> Self {
    self.persister = Some(persister);
    self
  }

  /// Callback invoked with each loaded value (both lazy prefills and fresh
  /// results).
  pub fn on_success<F>(mut self, on_success: F) -> Self
  where
    F: Fn(&Value) + Send + Sync + 'static,
  {
    self.on_success = Some(Arc::new(on_success));
    self
  }

  /// Callback invoked with the error message of each failed cycle.
  pub fn on_failure<F>(mut self, on_failure: F) -> Self
  where
    F: Fn(&str) + Send + Sync + 'static,
  {
    self.on_failure = Some(Arc::new(on_failure));
    self
  }

  /// Override the data-key function used to derive the cache-slot key from
  /// the params. See [`crate::key`] for the provided key functions.
  pub fn with_data_key<F>(mut self, data_key: F) -> Self
  where
    F: Fn(&str, Option<&Value>) -> String + Send + Sync + 'static,
  {
    self.data_key = Arc::new(data_key);
    self
  }

  /// The request name. All polling tasks for one name are single-flight.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The resolved cache-slot key for this descriptor.
  pub fn key(&self) -> String {
    key::resolve(&self.name, self.params.as_ref(), &self.data_key)
  }

  /// Reject descriptors that indicate programmer error. Checked at call
  /// time by `init`/`load`/`bind` so misconfiguration fails fast instead of
  /// surfacing as a silent runtime condition.
  pub(crate) fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(eyre!("Request descriptor must have a non-empty name"));
    }
    Ok(())
  }
}

impl std::fmt::Debug for Descriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Descriptor")
      .field("name", &self.name)
      .field("params", &self.params)
      .field("ttl", &self.ttl)
      .field("interval", &self.interval)
      .field("lazy_load", &self.lazy_load)
      .field("auto_load", &self.auto_load)
      .finish_non_exhaustive()
  }
}
