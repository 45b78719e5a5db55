//! Async data-loading coordinator.
//!
//! Given a named request with parameters, this crate fetches data
//! asynchronously, stores the result keyed by request identity, deduplicates
//! concurrent fetches per request name, supports time-to-live caching,
//! polling intervals with cancellation, and optional persistence to an
//! external store.
//!
//! # Example
//!
//! ```ignore
//! use dataloader::{DataLoader, Descriptor};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let loader = DataLoader::new();
//! let users = Descriptor::new("users", |_params| async {
//!     Ok(json!([{"id": 1}]))
//!   })
//!   .with_ttl(Duration::from_secs(60));
//!
//! loader.load(&users)?;
//!
//! // later, or from a subscriber:
//! let status = loader.status_of(&users);
//! if let Some(data) = status.data {
//!     // render
//! }
//! ```
//!
//! Failures never propagate out of a fetch cycle; observe
//! [`StatusRecord::error`] instead (stale data stays visible alongside the
//! error after a failed refresh).

mod binding;
mod descriptor;
mod key;
mod loader;
mod persister;
mod status;
mod validity;

pub use binding::Binding;
pub use descriptor::{ContinueFn, Descriptor, FailureFn, FetchFn, SuccessFn};
pub use key::{default_data_key, hashed_key, query_string_key, resolve, DataKeyFn};
pub use loader::DataLoader;
pub use persister::{DataPersister, MemoryPersister, NoopPersister, SqlitePersister};
pub use status::{StatusRecord, StatusTable};
pub use validity::is_valid;
