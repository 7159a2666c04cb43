//! Canonical-JSON checksums used to detect values-tree changes.
//!
//! `serde_json::Value`'s default map representation is a `BTreeMap`, so
//! keys are already sorted on serialization as long as the `preserve_order`
//! feature is not enabled anywhere in the dependency graph. We serialize
//! through `serde_json::to_vec` and hash the resulting bytes with SHA-256.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a stable hex-encoded checksum of a canonical JSON encoding of `value`.
pub fn checksum<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let bytes = canonical_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Serialize `value` to its canonical (sorted-key) JSON byte encoding.
pub fn canonical_bytes<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&as_value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checksum_is_stable_across_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn checksum_differs_on_value_change() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn checksum_is_invariant_under_noop_patch_roundtrip() {
        let mut value = json!({"a": {"b": 1}});
        let before = checksum(&value).unwrap();

        value["a"]["c"] = json!(2);
        value["a"].as_object_mut().unwrap().remove("c");

        let after = checksum(&value).unwrap();
        assert_eq!(before, after);
    }
}
