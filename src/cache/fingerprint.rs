//! Cache keys for backend calls.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derive the cache key for a call to `function` with `args`.
///
/// The argument list is serialized as JSON. serde_json keeps object keys
/// sorted, so structurally equal arguments always produce the same bytes
/// no matter how the objects were built.
pub fn fingerprint(function: &str, args: &[Value]) -> String {
  let serialized = Value::Array(args.to_vec()).to_string();

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(function.as_bytes());
  // Separator keeps ("ab", "c") and ("a", "bc") apart
  hasher.update([0u8]);
  hasher.update(serialized.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Map};

  #[test]
  fn test_identical_calls_collide() {
    let a = fingerprint("fetch_health_data", &[json!({"days": 7})]);
    let b = fingerprint("fetch_health_data", &[json!({"days": 7})]);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn test_different_args_or_function_differ() {
    let base = fingerprint("fetch_health_data", &[json!({"days": 7})]);
    assert_ne!(base, fingerprint("fetch_health_data", &[json!({"days": 30})]));
    assert_ne!(base, fingerprint("get_prediction", &[json!({"days": 7})]));
    assert_ne!(base, fingerprint("fetch_health_data", &[]));
  }

  #[test]
  fn test_key_order_does_not_matter() {
    let mut first = Map::new();
    first.insert("days".to_string(), json!(7));
    first.insert("fields".to_string(), json!(["steps"]));

    let mut second = Map::new();
    second.insert("fields".to_string(), json!(["steps"]));
    second.insert("days".to_string(), json!(7));

    assert_eq!(
      fingerprint("f", &[Value::Object(first)]),
      fingerprint("f", &[Value::Object(second)])
    );
  }

  #[test]
  fn test_name_and_args_boundary() {
    assert_ne!(
      fingerprint("get", &[json!("x")]),
      fingerprint("get[", &[json!("x")])
    );
  }
}
