//! Canonical JSON serialization and BLAKE3 hashing of trees.
//!
//! Two runs of the learner on the same input must produce the same tree
//! byte-for-byte; hashing the canonical form (recursively sorted keys, no
//! whitespace) is how that gets checked across platforms.

use crate::tree::Tree;
use serde::Serialize;
use std::collections::BTreeMap;

/// Serialize any model value to canonical JSON: object keys sorted
/// recursively, no whitespace.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize(&value))
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// BLAKE3 digest of the canonical JSON form of `tree`.
pub fn tree_hash(tree: &Tree) -> Result<[u8; 32], serde_json::Error> {
    let json = to_canonical_json(tree)?;
    Ok(*blake3::hash(json.as_bytes()).as_bytes())
}

/// [`tree_hash`] as a lowercase hex string.
pub fn tree_hash_hex(tree: &Tree) -> Result<String, serde_json::Error> {
    Ok(hex::encode(tree_hash(tree)?))
}
