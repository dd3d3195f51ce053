//! Circuit breaker: the halt authority.
//!
//! `NORMAL → QUARANTINED` is the only transition, and it is terminal within
//! this core — clearance is an out-of-band action that does not exist here.
//! The breaker never decides *whether* to halt; a calling validation module
//! passes it a failing verdict. On trigger it seals the audit session:
//! replay hash, signature over the canonical seal payload, seal hash,
//! a `halt_triggered` entry, then quarantine. A successful halt is reported
//! as `Ok` — the system correctly refusing to proceed is the desired
//! outcome, not an error.

use crate::audit::{AuditSession, OpContext};
use crate::canonical::CanonicalValue;
use crate::hash::{sha256_domain, SEAL_DOMAIN_V1};
use crate::sign::{PublicKey, SecretKey, SignatureScheme};
use crate::{CertrailError, Hash32, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Subject lifecycle. `Quarantined` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectStatus {
    Normal,
    Quarantined,
}

/// A signed, hashed record proving a halt decision was reached from a
/// specific, reproducible log state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalitySeal {
    pub seal_hash: Hash32,
    pub replay_hash: Hash32,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
    pub logical_timestamp: i64,
    pub trigger_reason: String,
}

/// Canonical payload the seal signature covers.
fn seal_payload(replay_hash: &Hash32, logical_timestamp: i64, reason: &str) -> Vec<u8> {
    let mut map = BTreeMap::new();
    map.insert(
        "replay_hash".to_string(),
        CanonicalValue::Bytes(replay_hash.0.to_vec()),
    );
    map.insert(
        "logical_timestamp".to_string(),
        CanonicalValue::Int(logical_timestamp),
    );
    map.insert(
        "trigger_reason".to_string(),
        CanonicalValue::Text(reason.to_string()),
    );
    CanonicalValue::Map(map).to_bytes()
}

fn seal_hash(replay_hash: &Hash32, signature: &[u8], metadata_hash: &Hash32) -> Hash32 {
    let mut buf = Vec::with_capacity(32 + signature.len() + 32);
    buf.extend_from_slice(&replay_hash.0);
    buf.extend_from_slice(signature);
    buf.extend_from_slice(&metadata_hash.0);
    sha256_domain(SEAL_DOMAIN_V1, &buf)
}

/// Verify a persisted seal against the public key that sealed it.
///
/// Checks the signature over the canonical payload and recomputes
/// `seal_hash` from the supplied metadata. `Ok(false)` means the seal does
/// not check out; `Err` means verification could not be attempted.
pub fn verify_seal(
    seal: &FinalitySeal,
    metadata: &BTreeMap<String, CanonicalValue>,
    scheme: &dyn SignatureScheme,
    public: &PublicKey,
) -> Result<bool> {
    let payload = seal_payload(&seal.replay_hash, seal.logical_timestamp, &seal.trigger_reason);
    if !scheme.verify(public, &payload, &seal.signature)? {
        return Ok(false);
    }
    let metadata_hash = CanonicalValue::Map(metadata.clone()).hash();
    Ok(seal_hash(&seal.replay_hash, &seal.signature, &metadata_hash) == seal.seal_hash)
}

/// Halt authority for one subject (a ledger, a bundle).
#[derive(Debug)]
pub struct CircuitBreaker {
    subject: String,
    status: SubjectStatus,
    seal: Option<FinalitySeal>,
}

impl CircuitBreaker {
    pub fn new(subject: impl Into<String>) -> Self {
        CircuitBreaker {
            subject: subject.into(),
            status: SubjectStatus::Normal,
            seal: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn status(&self) -> SubjectStatus {
        self.status
    }

    pub fn seal(&self) -> Option<&FinalitySeal> {
        self.seal.as_ref()
    }

    /// Seal the session and quarantine the subject.
    ///
    /// Steps, in order: take the replay hash of the log as it stands, sign
    /// the canonical seal payload, derive the seal hash (which also commits
    /// to the canonicalized trigger metadata), record a `halt_triggered`
    /// entry, finalize the session, mark the subject quarantined.
    ///
    /// The seal's replay hash covers the entries that justified the halt;
    /// the `halt_triggered` entry itself is covered by the finalized chain
    /// and the session's `log_hash`, not by the seal.
    ///
    /// A second trigger on the same subject fails with
    /// [`CertrailError::AlreadyQuarantined`]; exactly one seal ever exists.
    pub fn trigger(
        &mut self,
        session: &mut AuditSession,
        reason: &str,
        ctx: &OpContext,
        scheme: &dyn SignatureScheme,
        secret: &SecretKey,
    ) -> Result<FinalitySeal> {
        if self.status == SubjectStatus::Quarantined {
            return Err(CertrailError::AlreadyQuarantined(self.subject.clone()));
        }
        if session.is_finalized() {
            return Err(CertrailError::SessionReuse(
                "cannot seal an already-finalized session".into(),
            ));
        }

        let replay_hash = session.replay_hash();
        let payload = seal_payload(&replay_hash, ctx.logical_timestamp, reason);
        let signature = scheme.sign(secret, &payload)?;
        let metadata_hash = CanonicalValue::Map(ctx.quantum_metadata.clone()).hash();
        let seal_hash = seal_hash(&replay_hash, &signature, &metadata_hash);

        let mut details = BTreeMap::new();
        details.insert(
            "seal_hash".to_string(),
            CanonicalValue::Bytes(seal_hash.0.to_vec()),
        );
        details.insert(
            "replay_hash".to_string(),
            CanonicalValue::Bytes(replay_hash.0.to_vec()),
        );
        details.insert(
            "signature".to_string(),
            CanonicalValue::Bytes(signature.clone()),
        );
        details.insert(
            "metadata_hash".to_string(),
            CanonicalValue::Bytes(metadata_hash.0.to_vec()),
        );
        details.insert(
            "trigger_reason".to_string(),
            CanonicalValue::Text(reason.to_string()),
        );
        session.append("halt_triggered", CanonicalValue::Map(details), ctx)?;
        session.finalize()?;

        let seal = FinalitySeal {
            seal_hash,
            replay_hash,
            signature,
            logical_timestamp: ctx.logical_timestamp,
            trigger_reason: reason.to_string(),
        };
        self.status = SubjectStatus::Quarantined;
        self.seal = Some(seal.clone());
        warn!(subject = %self.subject, reason, "circuit breaker triggered; subject quarantined");
        Ok(seal)
    }
}
