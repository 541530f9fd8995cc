//! Canonical serialization for content-addressed hashes.
//!
//! Object keys are emitted in sorted order regardless of how the map was
//! built, so logically equal documents always produce identical bytes.

use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Compute sha256 of bytes, returning a "sha256:<hex>" string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Serialize a JSON value with sorted object keys and no whitespace.
///
/// Walks the document with an explicit work stack, so nesting depth is
/// bounded by memory rather than the call stack.
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    let mut stack = vec![Emit::Value(value)];

    while let Some(next) = stack.pop() {
        match next {
            Emit::Punct(c) => out.push(c),
            Emit::Key(key) => {
                out.push_str(&JsonValue::String(key.to_string()).to_string());
                out.push(':');
            }
            Emit::Value(JsonValue::Object(map)) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                stack.push(Emit::Punct('}'));
                for (i, key) in keys.into_iter().enumerate().rev() {
                    stack.push(Emit::Value(&map[key]));
                    stack.push(Emit::Key(key));
                    if i > 0 {
                        stack.push(Emit::Punct(','));
                    }
                }
            }
            Emit::Value(JsonValue::Array(items)) => {
                out.push('[');
                stack.push(Emit::Punct(']'));
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push(Emit::Value(item));
                    if i > 0 {
                        stack.push(Emit::Punct(','));
                    }
                }
            }
            Emit::Value(scalar) => out.push_str(&scalar.to_string()),
        }
    }
    out
}

/// Pending output of [`canonical_json`], popped in document order.
enum Emit<'a> {
    Value(&'a JsonValue),
    Key(&'a str),
    Punct(char),
}

/// Hash any serializable value through its canonical JSON form.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_value(value).expect("hashed values serialize to JSON");
    sha256_hex(canonical_json(&json).as_bytes())
}
