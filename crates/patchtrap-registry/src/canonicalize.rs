//! # Canonical Encodings for Fingerprint Inputs
//!
//! Fingerprints must be stable across repeated computation on an unmutated
//! reference. Every ordered input is therefore reduced to one canonical byte
//! form before it reaches SHA-256:
//!
//! - **Constant pools** are JSON values, serialized per RFC 8785 (JSON
//!   Canonicalization Scheme): object keys sorted by UTF-16 code units,
//!   minimal string escaping, no insignificant whitespace, arrays in order.
//! - **Name sequences** (free variables) are length-prefixed so that
//!   `["ab", "c"]` and `["a", "bc"]` never collide.
//! - **Instruction bytes** are hashed as-is; they are already a sequence.
//!
//! ## Threat Model
//!
//! Canonicalization defends against:
//!
//! - **Iteration-order noise**: map-backed constants that serialize in a
//!   different key order would otherwise flip the fingerprint on every check.
//! - **Boundary confusion**: concatenated names without framing let an
//!   attacker move bytes between neighbouring entries unnoticed.
//!
//! ## References
//!
//! - **RFC 8785** - "JSON Canonicalization Scheme (JCS)"
//!   <https://www.rfc-editor.org/rfc/rfc8785>
//! - **NIST FIPS 180-4** - Secure Hash Standard (SHA-256)
//!
//! ## Example
//!
//! ```rust
//! use patchtrap_registry::canonicalize::{canonicalize, hash_canonical, hash_sequence};
//! use serde_json::json;
//!
//! assert_eq!(canonicalize(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
//! assert_eq!(
//!     hash_canonical(&json!({"b": 1, "a": 2})),
//!     hash_canonical(&json!({"a": 2, "b": 1}))
//! );
//! assert_ne!(hash_sequence(["ab", "c"]), hash_sequence(["a", "bc"]));
//! ```

use crate::models::Hash;
use sha2::{Digest, Sha256};

/// Canonicalizes a JSON value according to RFC 8785.
pub fn canonicalize(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// SHA-256 of the RFC 8785 form of `value`.
pub fn hash_canonical(value: &serde_json::Value) -> Hash {
    hash_bytes(canonicalize(value).as_bytes())
}

/// SHA-256 of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// SHA-256 of an ordered sequence of strings.
///
/// Each element is framed by its byte length (u64, big-endian) and the
/// element count is hashed first, so the digest depends on both the
/// elements and their boundaries.
pub fn hash_sequence<I, S>(items: I) -> Hash
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<S> = items.into_iter().collect();
    let mut hasher = Sha256::new();
    hasher.update((items.len() as u64).to_be_bytes());
    for item in &items {
        let bytes = item.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().into()
}

fn write_value(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(true) => out.push_str("true"),
        serde_json::Value::Bool(false) => out.push_str("false"),
        serde_json::Value::Number(n) => out.push_str(&canonical_number(n)),
        serde_json::Value::String(s) => write_string(s, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            // Key order is by UTF-16 code units, not by map iteration order.
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if !f.is_finite() => "null".to_string(),
        Some(f) if f.fract() == 0.0 && f.abs() < (i64::MAX as f64) => (f as i64).to_string(),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\x20' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
