//! Canonical JSON rendering and content hashing.
//!
//! Hashes are SHA-256 over a canonical, compact JSON rendering of a value:
//! object keys are sorted, and arrays are either kept in order or (for filter
//! expressions, whose clause lists are unordered) sorted by their canonical form.

use serde_json::{Map, Value};
use sha2::Digest;

/// How arrays are treated when canonicalizing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOrder {
    /// Element order is significant.
    Preserve,
    /// Element order is ignored; elements are sorted by their canonical form.
    Unordered,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    hex::encode(digest)
}

/// Return a structurally equal value with sorted object keys (and sorted arrays
/// when `order` is [`ArrayOrder::Unordered`]).
pub fn canonicalize(value: &Value, order: ArrayOrder) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()], order));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(|v| canonicalize(v, order)).collect();
            if order == ArrayOrder::Unordered {
                items.sort_by_cached_key(Value::to_string);
            }
            Value::Array(items)
        }
        scalar => scalar.clone(),
    }
}

/// Compact canonical JSON text for `value`.
pub fn canonical_string(value: &Value, order: ArrayOrder) -> String {
    canonicalize(value, order).to_string()
}

/// SHA-256 (hex) of the canonical JSON text for `value`.
pub fn stable_hash(value: &Value, order: ArrayOrder) -> String {
    sha256_hex(canonical_string(value, order).as_bytes())
}

/// Hash of a data variable's filter expression.
///
/// Two filter objects that differ only in key order or clause order hash identically.
pub fn filter_hash(filters: &Value) -> String {
    stable_hash(filters, ArrayOrder::Unordered)
}
