//! Canonical hashing of recorded values and schemas (component C1).
//!
//! Hashes must be identical across independent processes and platforms for
//! identical logical input, so object keys are sorted before hashing and
//! numbers are rendered through `serde_json`'s own formatting rather than
//! re-derived from a float bit pattern.

use crate::value::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministically hash a value: sort object keys recursively, keep array
/// order, hash the resulting canonical byte stream with SHA-256.
///
/// We use a cryptographic digest (already a workspace dependency used for
/// the same purpose elsewhere) rather than a faster non-cryptographic one;
/// stability and the absence of accidental collisions between materially
/// different spans both matter more here than hashing throughput.
pub fn deterministic_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    write_canonical(value, &mut hasher);
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            hasher.update(b"#");
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"\"");
            hasher.update(s.as_bytes());
            hasher.update(b"\"");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                write_canonical(item, hasher);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        Value::Object(map) => {
            // BTreeMap sorts keys for us; values keep their own canonical form.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            hasher.update(b"{");
            for (key, val) in sorted {
                hasher.update(b"\"");
                hasher.update(key.as_bytes());
                hasher.update(b"\":");
                write_canonical(val, hasher);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
    }
}
