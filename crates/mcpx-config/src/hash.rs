use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ServerConfig;

/// Stable digest of a server config, used to detect config drift.
///
/// The config is serialized as canonical JSON (object keys sorted
/// recursively) and hashed with SHA-256; the full 64-char hex string is
/// returned. Two configs differing only in key order hash identically.
pub fn config_hash(config: &ServerConfig) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&value).as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Render a JSON value with object keys sorted recursively.
///
/// Explicit rather than relying on `serde_json`'s map ordering, which
/// flips to insertion order when any crate in the graph enables
/// `preserve_order`.
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
                out.push_str(&Value::String((*key).clone()).to_string());
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
        other => out.push_str(&other.to_string()),
    }
}
