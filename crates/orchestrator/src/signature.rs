//! Canonical call signatures used as deduplication keys.

use serde_json::Value;
use std::fmt;

/// Rendered in place of an argument bag the provider never sent.
const MISSING: &str = "<missing>";

/// Deterministic key for an operation name plus its arguments.
///
/// Two calls with structurally equal arguments produce the same signature
/// whatever their object key order. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sign a call.
pub fn sign(name: &str, args: Option<&Value>) -> Signature {
    let mut out = String::with_capacity(name.len() + 32);
    out.push_str(name);
    out.push(':');
    match args {
        Some(value) => canonicalize(value, &mut out),
        None => out.push_str(MISSING),
    }
    Signature(out)
}

/// Render `value` with object keys sorted, array order preserved and
/// primitives JSON-encoded.
pub fn canonical(value: &Value) -> String {
    let mut out = String::new();
    canonicalize(value, &mut out);
    out
}

fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => push_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out);
                out.push(':');
                canonicalize(&map[key], out);
            }
            out.push('}');
        }
    }
}

/// Integral floats render as integers so `1` and `1.0` agree.
fn canonical_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

fn push_json_string(s: &str, out: &mut String) {
    match serde_json::to_string(s) {
        Ok(encoded) => out.push_str(&encoded),
        // Serializing a &str cannot fail; keep the raw text just in case.
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}
