// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Canonical JSON serialization, volatile-field stripping, redaction, and
//! the event canonicalization pipeline (§4.1).

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::TrtError;
use crate::event::{NormalizedEvent, RawEvent, kind_for};

/// Fields zeroed before hashing and predicate extraction because they are
/// non-deterministic by construction (timing, process identity, run scoping).
const VOLATILE_KEYS: &[&str] = &[
    "rel_ms",
    "run_id",
    "latency_ms",
    "latency",
    "duration_ms",
    "pid",
    "ts",
    "timestamp",
    "monotonic_ts",
    "wall_time_ms",
];

/// Marker substituted for any text matched by a `redact` pattern.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Serialize a JSON value with object keys sorted lexicographically at every
/// nesting depth, no insignificant whitespace, and non-ASCII characters
/// escaped as `\uXXXX`. `serde_json::Value`'s default `Map` is a `BTreeMap`
/// (the `preserve_order` feature is not enabled anywhere in this workspace),
/// so key ordering falls out of `serde_json::to_string` for free; only the
/// non-ASCII escaping needs a manual pass.
pub fn canonical_json(value: &Value) -> Result<String, TrtError> {
    let s = serde_json::to_string(value)?;
    Ok(escape_non_ascii(&s))
}

fn escape_non_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut buf = [0u16; 2];
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Remove volatile fields recursively from a JSON value in place.
fn strip_volatile(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_volatile(item);
            }
        }
        Value::Object(map) => {
            map.retain(|k, _| !VOLATILE_KEYS.contains(&k.as_str()));
            for v in map.values_mut() {
                strip_volatile(v);
            }
        }
        _ => {}
    }
}

fn redact_string(s: &str, patterns: &[Regex]) -> String {
    let mut out = s.to_string();
    for re in patterns {
        if re.is_match(&out) {
            out = re.replace_all(&out, REDACTION_MARKER).into_owned();
        }
    }
    out
}

/// Apply redaction patterns to both object keys and string values,
/// recursively. Matched substrings are replaced by [`REDACTION_MARKER`].
fn redact_value(value: &mut Value, patterns: &[Regex]) {
    if patterns.is_empty() {
        return;
    }
    match value {
        Value::String(s) => *s = redact_string(s, patterns),
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item, patterns);
            }
        }
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let Some(mut v) = map.remove(&key) else {
                    continue;
                };
                redact_value(&mut v, patterns);
                let new_key = redact_string(&key, patterns);
                map.insert(new_key, v);
            }
        }
        _ => {}
    }
}

/// Compile `redact` pattern strings from a resolved spec into [`Regex`]es.
pub fn compile_redactions(patterns: &[String]) -> Result<Vec<Regex>, TrtError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(TrtError::from))
        .collect()
}

/// Canonicalize a single raw event: validate its shape, strip volatile
/// fields, apply redaction, assign the normalized `kind`, and compute
/// `event_id`. Redaction always runs before hashing and before predicate
/// extraction, per the ordering requirement in the design notes.
pub fn canonicalize(raw: &RawEvent, redactions: &[Regex]) -> Result<NormalizedEvent, TrtError> {
    raw.validate_shape()?;

    let mut payload = raw.payload.clone();
    strip_volatile(&mut payload);
    redact_value(&mut payload, redactions);

    let mut meta_value = Value::Object(raw.meta.clone().into_iter().collect());
    strip_volatile(&mut meta_value);
    redact_value(&mut meta_value, redactions);
    let meta: BTreeMap<String, Value> = match meta_value {
        Value::Object(m) => m.into_iter().collect(),
        _ => BTreeMap::new(),
    };

    let kind = kind_for(raw.event_type, &payload);

    let hashable = serde_json::json!({
        "event_type": raw.event_type,
        "seq": raw.seq,
        "payload": payload,
        "meta": meta,
    });
    let canon = canonical_json(&hashable)?;
    let event_id = sha256_hex(canon.as_bytes());

    Ok(NormalizedEvent {
        event_type: raw.event_type,
        seq: raw.seq,
        rel_ms: raw.rel_ms,
        payload,
        meta,
        event_id,
        kind,
    })
}
