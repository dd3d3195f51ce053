//! Canonical serialization of structured values.
//!
//! [`CanonicalValue`] is a closed, tagged union of the value kinds permitted
//! in audit payloads and signing preimages: integers, fixed-point decimals,
//! UTF-8 text, byte strings, sequences and key-sorted maps. Because the union
//! is closed, canonicalization is total: every value has exactly one byte
//! encoding, map key order never leaks into the output, and binary floating
//! point is unrepresentable (conversion from JSON rejects it).
//!
//! Two renderings exist:
//! - [`CanonicalValue::to_bytes`] — the tagged, length-prefixed preimage used
//!   for hashing and signing,
//! - [`CanonicalValue::to_json`] — the human-readable persisted form (sorted
//!   keys, decimals as strings, bytes as lowercase hex).

use crate::decimal::FixedDecimal;
use crate::hash::{sha256_domain, CANONICAL_VALUE_DOMAIN_V1};
use crate::{CertrailError, Hash32, Result};
use std::collections::BTreeMap;

/// Encoding tags (v1). New kinds get new tags; existing tags never change.
mod tags {
    pub const INT: u8 = 0x00;
    pub const DECIMAL: u8 = 0x01;
    pub const TEXT: u8 = 0x02;
    pub const BYTES: u8 = 0x03;
    pub const LIST: u8 = 0x04;
    pub const MAP: u8 = 0x05;
}

/// A structured value with a total canonical encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalValue {
    Int(i64),
    Decimal(FixedDecimal),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Deterministic byte encoding: `tag || length-prefixed payload`, maps in
    /// key order. Structurally equal values encode byte-identically
    /// regardless of construction order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            CanonicalValue::Int(i) => {
                buf.push(tags::INT);
                buf.extend_from_slice(&i.to_le_bytes());
            }
            CanonicalValue::Decimal(d) => {
                let s = d.to_decimal_string();
                buf.push(tags::DECIMAL);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            CanonicalValue::Text(s) => {
                buf.push(tags::TEXT);
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            CanonicalValue::Bytes(b) => {
                buf.push(tags::BYTES);
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
            CanonicalValue::List(items) => {
                buf.push(tags::LIST);
                buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
            CanonicalValue::Map(entries) => {
                // BTreeMap iterates in key order; no explicit sort needed.
                buf.push(tags::MAP);
                buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for (key, value) in entries {
                    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    buf.extend_from_slice(key.as_bytes());
                    value.encode_into(buf);
                }
            }
        }
    }

    /// Domain-separated SHA-256 over the canonical byte encoding.
    pub fn hash(&self) -> Hash32 {
        sha256_domain(CANONICAL_VALUE_DOMAIN_V1, &self.to_bytes())
    }

    /// Canonical JSON rendering: decimals as strings, bytes as lowercase
    /// hex, object keys sorted (serde_json's default map preserves the
    /// sorted order of the underlying `BTreeMap`).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CanonicalValue::Int(i) => serde_json::Value::from(*i),
            CanonicalValue::Decimal(d) => serde_json::Value::from(d.to_decimal_string()),
            CanonicalValue::Text(s) => serde_json::Value::from(s.clone()),
            CanonicalValue::Bytes(b) => serde_json::Value::from(hex::encode(b)),
            CanonicalValue::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            CanonicalValue::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert a JSON value into the canonical union.
    ///
    /// Fail-closed: floating-point numbers, integers outside `i64`, and JSON
    /// `null` have no canonical form and are rejected with
    /// [`CertrailError::Validation`]. JSON strings become [`Text`]; callers
    /// that mean decimals or bytes construct those kinds explicitly.
    ///
    /// [`Text`]: CanonicalValue::Text
    pub fn from_json(value: &serde_json::Value) -> Result<CanonicalValue> {
        match value {
            serde_json::Value::Null => Err(CertrailError::Validation(
                "null has no canonical form".into(),
            )),
            serde_json::Value::Bool(_) => Err(CertrailError::Validation(
                "booleans have no canonical form; encode as Int 0/1".into(),
            )),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CanonicalValue::Int(i))
                } else {
                    Err(CertrailError::Validation(format!(
                        "number {n} is not an i64; floating point is forbidden"
                    )))
                }
            }
            serde_json::Value::String(s) => Ok(CanonicalValue::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let converted: Result<Vec<_>> =
                    items.iter().map(CanonicalValue::from_json).collect();
                Ok(CanonicalValue::List(converted?))
            }
            serde_json::Value::Object(entries) => {
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    map.insert(k.clone(), CanonicalValue::from_json(v)?);
                }
                Ok(CanonicalValue::Map(map))
            }
        }
    }
}

impl From<FixedDecimal> for CanonicalValue {
    fn from(d: FixedDecimal) -> Self {
        CanonicalValue::Decimal(d)
    }
}

impl From<i64> for CanonicalValue {
    fn from(i: i64) -> Self {
        CanonicalValue::Int(i)
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        CanonicalValue::Text(s.to_string())
    }
}
