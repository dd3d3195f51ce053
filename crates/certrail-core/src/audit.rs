//! Causal, tamper-evident audit log of operations.
//!
//! An [`AuditSession`] owns one ordered, append-only log. Lifecycle:
//! open (mutable, chain unset) → active (entries appended by the certified
//! engine) → finalized (the `prev_hash` chain is computed and the log becomes
//! read-only) → exported/hashed. Finalization is explicit and idempotent-once;
//! a finalized session used as if still open fails with
//! [`CertrailError::SessionReuse`].
//!
//! `entry_hash` covers the canonical encoding of an entry with `prev_hash`
//! excluded (no self-reference); `prev_hash` is assigned only at finalization
//! by walking entries in append order from the all-zero genesis sentinel.

use crate::canonical::CanonicalValue;
use crate::hash::{sha256_domain, AUDIT_ENTRY_DOMAIN_V1, LOG_REPLAY_DOMAIN_V1};
use crate::{CertrailError, Hash32, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Genesis sentinel: the first entry of every chain links to all zeroes.
pub const ZERO_HASH: Hash32 = Hash32([0u8; 32]);

/// Caller-supplied context threaded through every logged operation.
///
/// Wall-clock time and ambient randomness are forbidden in this core;
/// `logical_timestamp` is whatever monotonic integer the caller's replay
/// discipline defines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpContext {
    pub correlation_id: String,
    pub logical_timestamp: i64,
    pub quantum_metadata: BTreeMap<String, CanonicalValue>,
}

impl OpContext {
    pub fn new(correlation_id: impl Into<String>, logical_timestamp: i64) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            logical_timestamp,
            quantum_metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: CanonicalValue,
    ) -> Self {
        self.quantum_metadata.insert(key.into(), value);
        self
    }
}

/// One logged operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEntry {
    pub index: u64,
    pub operation: String,
    pub details: CanonicalValue,
    pub correlation_id: String,
    pub quantum_metadata: BTreeMap<String, CanonicalValue>,
    pub logical_timestamp: i64,
    pub entry_hash: Hash32,
    /// Unset until the owning session is finalized.
    pub prev_hash: Option<Hash32>,
}

impl AuditEntry {
    /// Canonical preimage of this entry, `prev_hash` excluded.
    fn preimage(&self) -> CanonicalValue {
        let mut map = BTreeMap::new();
        map.insert("index".to_string(), CanonicalValue::Int(self.index as i64));
        map.insert(
            "operation".to_string(),
            CanonicalValue::Text(self.operation.clone()),
        );
        map.insert("details".to_string(), self.details.clone());
        map.insert(
            "correlation_id".to_string(),
            CanonicalValue::Text(self.correlation_id.clone()),
        );
        map.insert(
            "quantum_metadata".to_string(),
            CanonicalValue::Map(self.quantum_metadata.clone()),
        );
        map.insert(
            "logical_timestamp".to_string(),
            CanonicalValue::Int(self.logical_timestamp),
        );
        CanonicalValue::Map(map)
    }

    fn compute_hash(&self) -> Hash32 {
        sha256_domain(AUDIT_ENTRY_DOMAIN_V1, &self.preimage().to_bytes())
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("index".into(), serde_json::Value::from(self.index));
        obj.insert(
            "operation".into(),
            serde_json::Value::from(self.operation.clone()),
        );
        obj.insert("details".into(), self.details.to_json());
        obj.insert(
            "correlation_id".into(),
            serde_json::Value::from(self.correlation_id.clone()),
        );
        obj.insert(
            "quantum_metadata".into(),
            CanonicalValue::Map(self.quantum_metadata.clone()).to_json(),
        );
        obj.insert(
            "logical_timestamp".into(),
            serde_json::Value::from(self.logical_timestamp),
        );
        obj.insert(
            "entry_hash".into(),
            serde_json::Value::from(self.entry_hash.to_hex()),
        );
        obj.insert(
            "prev_hash".into(),
            match self.prev_hash {
                Some(h) => serde_json::Value::from(h.to_hex()),
                None => serde_json::Value::Null,
            },
        );
        serde_json::Value::Object(obj)
    }
}

/// A scoped, append-only, causally hash-chained record of operations.
#[derive(Clone, Debug, Default)]
pub struct AuditSession {
    entries: Vec<AuditEntry>,
    finalized: bool,
}

impl AuditSession {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Append a structured entry. Fails with
    /// [`CertrailError::SessionReuse`] once the session is finalized.
    pub fn append(
        &mut self,
        operation: &str,
        details: CanonicalValue,
        ctx: &OpContext,
    ) -> Result<&AuditEntry> {
        if self.finalized {
            return Err(CertrailError::SessionReuse(format!(
                "cannot append {operation:?} to a finalized session"
            )));
        }
        let mut entry = AuditEntry {
            index: self.entries.len() as u64,
            operation: operation.to_string(),
            details,
            correlation_id: ctx.correlation_id.clone(),
            quantum_metadata: ctx.quantum_metadata.clone(),
            logical_timestamp: ctx.logical_timestamp,
            entry_hash: ZERO_HASH,
            prev_hash: None,
        };
        entry.entry_hash = entry.compute_hash();
        self.entries.push(entry);
        Ok(self.entries.last().expect("just pushed"))
    }

    /// Compute the `prev_hash` chain and irreversibly seal the log.
    ///
    /// The first entry links to [`ZERO_HASH`]; entry `i` links to entry
    /// `i-1`'s `entry_hash`. A second call fails with
    /// [`CertrailError::SessionReuse`].
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(CertrailError::SessionReuse(
                "session is already finalized".into(),
            ));
        }
        let mut prev = ZERO_HASH;
        for entry in &mut self.entries {
            entry.prev_hash = Some(prev);
            prev = entry.entry_hash;
        }
        self.finalized = true;
        debug!(entries = self.entries.len(), "audit session finalized");
        Ok(())
    }

    /// Replay digest over the entries recorded so far.
    ///
    /// Entry hashes already commit to the full canonical content and the
    /// strictly sequential indices, so the digest is
    /// `H(domain || count || h_0 || h_1 || ...)`.
    pub fn replay_hash(&self) -> Hash32 {
        let mut buf = Vec::with_capacity(4 + self.entries.len() * 32);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.entry_hash.0);
        }
        sha256_domain(LOG_REPLAY_DOMAIN_V1, &buf)
    }

    /// Stable digest over the finalized, canonicalized entry list.
    ///
    /// Two sessions fed identical operation sequences with identical logical
    /// timestamps and correlation ids yield identical hashes.
    pub fn log_hash(&self) -> Result<Hash32> {
        if !self.finalized {
            return Err(CertrailError::Validation(
                "log_hash requires a finalized session".into(),
            ));
        }
        Ok(self.replay_hash())
    }

    /// Recompute every entry hash and the chain linkage of a finalized
    /// session; any mismatch means the log was tampered with after sealing.
    pub fn verify_chain(&self) -> Result<()> {
        if !self.finalized {
            return Err(CertrailError::Validation(
                "verify_chain requires a finalized session".into(),
            ));
        }
        let mut prev = ZERO_HASH;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.index != i as u64 {
                return Err(CertrailError::Validation(format!(
                    "entry {i} has index {}",
                    entry.index
                )));
            }
            if entry.compute_hash() != entry.entry_hash {
                return Err(CertrailError::Validation(format!(
                    "entry {i} hash mismatch"
                )));
            }
            if entry.prev_hash != Some(prev) {
                return Err(CertrailError::Validation(format!(
                    "entry {i} chain linkage broken"
                )));
            }
            prev = entry.entry_hash;
        }
        Ok(())
    }

    /// Export a finalized session as a canonical JSON document: the ordered
    /// entry list with `entry_hash`/`prev_hash` fields plus the log hash.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let log_hash = self.log_hash()?;
        let mut obj = serde_json::Map::new();
        obj.insert(
            "entries".into(),
            serde_json::Value::Array(self.entries.iter().map(AuditEntry::to_json).collect()),
        );
        obj.insert(
            "log_hash".into(),
            serde_json::Value::from(log_hash.to_hex()),
        );
        Ok(serde_json::Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(n: i64) -> CanonicalValue {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), CanonicalValue::Int(n));
        CanonicalValue::Map(map)
    }

    fn session_with(ops: &[(&str, i64)]) -> AuditSession {
        let mut session = AuditSession::open();
        for (op, n) in ops {
            let ctx = OpContext::new("cid", 7);
            session.append(op, details(*n), &ctx).unwrap();
        }
        session
    }

    #[test]
    fn append_assigns_sequential_indices() {
        let session = session_with(&[("add", 1), ("mul", 2), ("div", 3)]);
        let indices: Vec<u64> = session.entries().iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(session.entries().iter().all(|e| e.prev_hash.is_none()));
    }

    #[test]
    fn finalize_links_chain_from_zero_sentinel() {
        let mut session = session_with(&[("add", 1), ("mul", 2)]);
        session.finalize().unwrap();

        let entries = session.entries();
        assert_eq!(entries[0].prev_hash, Some(ZERO_HASH));
        assert_eq!(entries[1].prev_hash, Some(entries[0].entry_hash));
        session.verify_chain().unwrap();
    }

    #[test]
    fn finalized_session_rejects_reuse() {
        let mut session = session_with(&[("add", 1)]);
        session.finalize().unwrap();

        let ctx = OpContext::new("cid", 7);
        assert!(matches!(
            session.append("add", details(9), &ctx).unwrap_err(),
            CertrailError::SessionReuse(_)
        ));
        assert!(matches!(
            session.finalize().unwrap_err(),
            CertrailError::SessionReuse(_)
        ));
    }

    #[test]
    fn log_hash_requires_finalization() {
        let session = session_with(&[("add", 1)]);
        assert!(session.log_hash().is_err());
    }

    #[test]
    fn identical_sessions_hash_identically() {
        let mut a = session_with(&[("add", 1), ("mul", 2)]);
        let mut b = session_with(&[("add", 1), ("mul", 2)]);
        a.finalize().unwrap();
        b.finalize().unwrap();
        assert_eq!(a.log_hash().unwrap(), b.log_hash().unwrap());
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn timestamp_and_correlation_id_are_hash_relevant() {
        let mut a = AuditSession::open();
        a.append("add", details(1), &OpContext::new("x", 1)).unwrap();
        a.finalize().unwrap();

        let mut b = AuditSession::open();
        b.append("add", details(1), &OpContext::new("x", 2)).unwrap();
        b.finalize().unwrap();

        let mut c = AuditSession::open();
        c.append("add", details(1), &OpContext::new("y", 1)).unwrap();
        c.finalize().unwrap();

        let ha = a.log_hash().unwrap();
        assert_ne!(ha, b.log_hash().unwrap());
        assert_ne!(ha, c.log_hash().unwrap());
    }

    #[test]
    fn metadata_is_hash_relevant() {
        let mut a = AuditSession::open();
        let ctx = OpContext::new("x", 1).with_metadata("lattice", CanonicalValue::Int(4));
        a.append("add", details(1), &ctx).unwrap();
        a.finalize().unwrap();

        let mut b = AuditSession::open();
        b.append("add", details(1), &OpContext::new("x", 1)).unwrap();
        b.finalize().unwrap();
        assert_ne!(a.log_hash().unwrap(), b.log_hash().unwrap());
    }

    #[test]
    fn verify_chain_detects_tampering() {
        let mut session = session_with(&[("add", 1), ("mul", 2)]);
        session.finalize().unwrap();
        session.entries[1].details = details(999);
        let err = session.verify_chain().unwrap_err();
        assert!(matches!(err, CertrailError::Validation(_)));
    }

    #[test]
    fn export_includes_chain_fields() {
        let mut session = session_with(&[("add", 1)]);
        session.finalize().unwrap();
        let json = session.to_json().unwrap();
        let entry = &json["entries"][0];
        assert_eq!(entry["index"], 0);
        assert_eq!(entry["operation"], "add");
        assert_eq!(entry["prev_hash"], ZERO_HASH.to_hex());
        assert_eq!(
            json["log_hash"].as_str().unwrap(),
            session.log_hash().unwrap().to_hex()
        );
    }
}
