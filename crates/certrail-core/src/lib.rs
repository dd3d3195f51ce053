//! Certrail core: deterministic certified computation with a tamper-evident
//! audit trail.
//!
//! Every economically meaningful computation in the host system runs through
//! this crate:
//! - exact fixed-point decimal arithmetic ([`decimal`]),
//! - mandatory per-operation audit logging into hash-chained sessions
//!   ([`engine`], [`audit`]),
//! - canonical, order-independent serialization for hashing and signing
//!   ([`canonical`]),
//! - stateless bound checks against the economics constitution ([`guard`]),
//! - cross-cutting allocation invariants ([`invariants`]),
//! - a fail-closed halt authority that seals the audit trail on violation
//!   ([`breaker`]).
//!
//! The core is synchronous and computation-bound. Sessions are sequential
//! per owner; independent sessions may run on separate threads with no shared
//! mutable state. No component reads a wall clock or an OS randomness source:
//! timestamps are caller-supplied logical integers and key material derives
//! from caller-supplied seeds.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub mod audit;
pub mod breaker;
pub mod canonical;
pub mod config;
pub mod constitution;
pub mod decimal;
pub mod engine;
pub mod guard;
pub mod hash;
pub mod invariants;
pub mod sign;

pub use audit::{AuditEntry, AuditSession, OpContext, ZERO_HASH};
pub use breaker::{verify_seal, CircuitBreaker, FinalitySeal, SubjectStatus};
pub use canonical::CanonicalValue;
pub use config::CertrailConfig;
pub use constitution::{Bound, EconomicsConstitution};
pub use decimal::FixedDecimal;
pub use engine::{certified_add, certified_div, certified_mul, certified_sub};
pub use guard::{GuardCode, ValidationResult};
pub use invariants::{
    allocation_set_hash, AllocationOp, BatchOutcome, InvariantChecker, InvariantCheckResult,
    InvariantCode,
};
pub use sign::{
    with_secret, Ed25519Scheme, HashScheme, PublicKey, SchemeKind, SecretKey, SignatureScheme,
    SEED_LEN,
};

/// 32-byte hash newtype used for all commitments (entries, replay hashes,
/// seals, canonical values).
///
/// Serializes as a lowercase hex string so persisted artifacts match the
/// canonical byte-rendering rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CertrailError::Validation(format!("invalid hash hex: {e}")))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CertrailError::Validation("hash must be exactly 32 bytes".into()))?;
        Ok(Hash32(raw))
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Unified error type for certrail core operations.
///
/// Guard and invariant *failures* are not errors — they are returned as
/// [`guard::ValidationResult`] / [`invariants::InvariantCheckResult`] values.
/// This enum covers genuinely unrecoverable conditions: arithmetic
/// corruption, key-handling misuse, session misuse and configuration
/// problems.
#[derive(Debug, Error)]
pub enum CertrailError {
    /// Arithmetic result outside the representable fixed-point range.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Malformed or out-of-range input (decimal strings, hex, canonical
    /// values, division by zero).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Keygen seed of the wrong length.
    #[error("seed must be exactly {expected} bytes, got {actual}")]
    SeedLength { expected: usize, actual: usize },

    /// Signing/verification could not be attempted (malformed key material).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A finalized audit session was used as if still open.
    #[error("audit session is finalized: {0}")]
    SessionReuse(String),

    /// The circuit breaker was triggered on an already-quarantined subject.
    #[error("subject already quarantined: {0}")]
    AlreadyQuarantined(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CertrailError>;
