//! Canonical comparison keys for payloads.
//!
//! Two payloads are considered equal when their canonical keys are equal.
//! The key function is pluggable: the default renders strings verbatim and
//! everything else as compact JSON. That keeps the integer `1` and the float
//! `1.0` apart, and folds the number `1` together with the string `"1"`.
//! Hosts that need a different notion of equality supply their own
//! [`Canonicalizer`], or a plain closure.

use serde_json::Value;

/// Maps a payload to the key used for equality comparison and vote tallies.
pub trait Canonicalizer: Send + Sync {
    /// Returns the canonical key for `value`.
    fn canonical_key(&self, value: &Value) -> String;
}

impl<F> Canonicalizer for F
where
    F: Fn(&Value) -> String + Send + Sync,
{
    fn canonical_key(&self, value: &Value) -> String {
        self(value)
    }
}

/// Default canonicalization: strings verbatim, other values as compact JSON.
///
/// Object keys are emitted in sorted order by `serde_json`, so structurally
/// equal objects produce equal keys regardless of insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayCanonicalizer;

impl Canonicalizer for DisplayCanonicalizer {
    fn canonical_key(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Canonicalization that treats numerically equal values as equal.
///
/// `"1"`, `1` and `1.0` share the key `1`. Strings are trimmed before the
/// numeric check. Arrays and objects are canonicalized element-wise.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericCanonicalizer;

impl NumericCanonicalizer {
    fn number_key(n: f64) -> String {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
            #[allow(clippy::cast_possible_truncation)]
            let i = n as i64;
            i.to_string()
        } else {
            n.to_string()
        }
    }
}

impl Canonicalizer for NumericCanonicalizer {
    fn canonical_key(&self, value: &Value) -> String {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| n.to_string(), Self::number_key),
            Value::String(s) => {
                let trimmed = s.trim();
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => Self::number_key(n),
                    _ => trimmed.to_string(),
                }
            }
            Value::Array(items) => {
                let keys: Vec<String> = items.iter().map(|v| self.canonical_key(v)).collect();
                format!("[{}]", keys.join(","))
            }
            Value::Object(map) => {
                let mut entries: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k}:{}", self.canonical_key(v)))
                    .collect();
                entries.sort();
                format!("{{{}}}", entries.join(","))
            }
            other => other.to_string(),
        }
    }
}
