//! Deterministic cache keys for tool calls.
//!
//! The in-sandbox runtime deduplicates identical tool calls within one
//! execution. Its key function is mirrored here so the host can verify
//! parity and tests can pin the digest format: SHA-256 over
//! `tool + ":" + canonical_json(args)`, where canonical JSON sorts object
//! keys recursively and keeps array order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value with all object keys sorted recursively.
///
/// Scalars and strings use the standard serde_json rendering, so the output
/// matches `JSON.stringify` for the integer-and-string payloads tool calls
/// are made of.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string keys always encode"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).expect("scalars always encode"));
        }
    }
}

/// Digest of `(tool, args)` with canonicalized key ordering, as lowercase hex.
pub fn cache_key(tool: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(args).as_bytes());
    hex::encode(hasher.finalize())
}
