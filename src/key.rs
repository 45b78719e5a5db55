//! Cache-slot key resolution.
//!
//! Every request resolves to a key of the form `name/<data key>`. The data
//! key part is produced by a caller-supplied function; the default ignores
//! params entirely, so all calls for the same name share one cache slot
//! unless the caller opts in to a params-aware key function.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use url::form_urlencoded;

/// Function deriving the per-params portion of a request key.
pub type DataKeyFn = Arc<dyn Fn(&str, Option<&Value>) -> String + Send + Sync>;

/// Full cache-slot identity for a request: `name/<data key>`.
pub fn resolve(name: &str, params: Option<&Value>, data_key: &DataKeyFn) -> String {
  format!("{}/{}", name, data_key(name, params))
}

/// Default data key: params are ignored, every call for a name shares
/// one cache slot.
pub fn default_data_key(_name: &str, _params: Option<&Value>) -> String {
  "default".to_string()
}

/// Params-aware data key that serializes object params as a query string
/// (`k=v&k=v` in field enumeration order, URL-encoded). Scalar params are
/// URL-encoded directly. Absent params fall back to the default key.
pub fn query_string_key(_name: &str, params: Option<&Value>) -> String {
  match params {
    None | Some(Value::Null) => "default".to_string(),
    Some(Value::Object(fields)) => {
      let mut query = form_urlencoded::Serializer::new(String::new());
      for (field, value) in fields {
        query.append_pair(field, &scalar_text(value));
      }
      query.finish()
    }
    Some(scalar) => form_urlencoded::byte_serialize(scalar_text(scalar).as_bytes()).collect(),
  }
}

/// Params-aware data key producing a stable fixed-length SHA-256 hex digest
/// of the params JSON. Useful when params are large or deeply nested.
pub fn hashed_key(name: &str, params: Option<&Value>) -> String {
  let params_json = params.map(|p| p.to_string()).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(name.as_bytes());
  hasher.update(b":");
  hasher.update(params_json.as_bytes());
  hex::encode(hasher.finalize())
}

fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key_fn(f: fn(&str, Option<&Value>) -> String) -> DataKeyFn {
    Arc::new(f)
  }

  #[test]
  fn default_key_ignores_params() {
    let f = key_fn(default_data_key);
    assert_eq!(resolve("users", None, &f), "users/default");
    assert_eq!(resolve("users", Some(&json!({"id": 1})), &f), "users/default");
  }

  #[test]
  fn query_string_key_is_deterministic() {
    let params = json!({"page": 2, "q": "hello world"});
    let a = query_string_key("users", Some(&params));
    let b = query_string_key("users", Some(&params));
    assert_eq!(a, b);
    assert_eq!(a, "page=2&q=hello+world");
  }

  #[test]
  fn query_string_key_encodes_scalars() {
    assert_eq!(query_string_key("users", Some(&json!("a b"))), "a+b");
    assert_eq!(query_string_key("users", Some(&json!(42))), "42");
    assert_eq!(query_string_key("users", None), "default");
  }

  #[test]
  fn distinct_params_resolve_to_distinct_keys() {
    let f = key_fn(query_string_key);
    let one = resolve("users", Some(&json!({"id": 1})), &f);
    let two = resolve("users", Some(&json!({"id": 2})), &f);
    assert_ne!(one, two);
  }

  #[test]
  fn hashed_key_is_stable_and_fixed_length() {
    let params = json!({"filter": {"tags": ["a", "b"]}});
    let a = hashed_key("search", Some(&params));
    let b = hashed_key("search", Some(&params));
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert_ne!(a, hashed_key("search", None));
  }
}
