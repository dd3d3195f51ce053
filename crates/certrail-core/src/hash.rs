//! SHA-256 helpers and domain separation tags.
//!
//! Every hash in this crate is domain-separated so that preimages from one
//! context can never collide with another (entry vs. replay vs. seal).

use crate::Hash32;
use sha2::{Digest, Sha256};

/// Domain separation tag for audit entry hashes.
pub const AUDIT_ENTRY_DOMAIN_V1: &[u8] = b"CERTRAIL_AUDIT_ENTRY_V1";

/// Domain separation tag for session replay hashes.
pub const LOG_REPLAY_DOMAIN_V1: &[u8] = b"CERTRAIL_LOG_REPLAY_V1";

/// Domain separation tag for canonical value hashes.
pub const CANONICAL_VALUE_DOMAIN_V1: &[u8] = b"CERTRAIL_CANONICAL_VALUE_V1";

/// Domain separation tag for finality seal hashes.
pub const SEAL_DOMAIN_V1: &[u8] = b"CERTRAIL_SEAL_V1";

/// Domain separation tag for the hash-backed signature stand-in.
pub const HASH_SCHEME_PUBKEY_DOMAIN_V1: &[u8] = b"CERTRAIL_HASH_SCHEME_PUBKEY_V1";

/// Domain separation tag for signatures produced by the hash-backed stand-in.
pub const HASH_SCHEME_SIG_DOMAIN_V1: &[u8] = b"CERTRAIL_HASH_SCHEME_SIG_V1";

/// Compute a deterministic SHA-256 hash of a byte slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    Hash32(hasher.finalize().into())
}
