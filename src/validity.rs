//! Cache validity checks.

use std::time::Duration;

use chrono::Utc;

use crate::status::StatusRecord;

/// Check whether cached data for a record is still fresh given a
/// time-to-live. A zero TTL (the default) always reports invalid, so
/// caching is opt-in. A record that has only ever failed carries no
/// `last_update_time` and is always invalid; `error` is never inspected.
pub fn is_valid(record: Option<&StatusRecord>, ttl: Duration) -> bool {
  if ttl.is_zero() {
    return false;
  }
  let Some(record) = record else {
    return false;
  };
  let Some(updated) = record.last_update_time else {
    return false;
  };
  let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
  Utc::now() - updated < ttl
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::status::{load_failure, load_success, StatusTable};
  use serde_json::json;
  use std::collections::HashMap;
  use std::sync::Arc;

  fn record_after_success() -> StatusRecord {
    let empty: StatusTable = Arc::new(HashMap::new());
    load_success(&empty, "k", json!(1), true).get("k").cloned().unwrap()
  }

  #[test]
  fn zero_ttl_is_never_valid() {
    let record = record_after_success();
    assert!(!is_valid(Some(&record), Duration::ZERO));
  }

  #[test]
  fn missing_record_is_invalid() {
    assert!(!is_valid(None, Duration::from_secs(60)));
  }

  #[test]
  fn fresh_record_is_valid_within_ttl() {
    let record = record_after_success();
    assert!(is_valid(Some(&record), Duration::from_secs(60)));
  }

  #[test]
  fn expired_record_is_invalid() {
    let mut record = record_after_success();
    record.last_update_time = Some(Utc::now() - chrono::Duration::seconds(10));
    assert!(!is_valid(Some(&record), Duration::from_secs(5)));
  }

  #[test]
  fn failed_only_record_is_invalid() {
    let empty: StatusTable = Arc::new(HashMap::new());
    let record = load_failure(&empty, "k", "boom").get("k").cloned().unwrap();
    assert!(!is_valid(Some(&record), Duration::from_secs(60)));
  }
}
