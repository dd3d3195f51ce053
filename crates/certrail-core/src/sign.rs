//! Signing capability.
//!
//! The core consumes signatures through [`SignatureScheme`], a small
//! polymorphic surface with two concrete backends selected once at process
//! start (see [`crate::config`]), never at call sites:
//!
//! - [`Ed25519Scheme`] — ed25519-dalek; the production backend.
//! - [`HashScheme`] — a deterministic SHA-256 stand-in with the same shape,
//!   for environments without the real scheme. It binds signatures to the
//!   public key and message but offers no unforgeability; test/dev only.
//!
//! Key generation takes a caller-supplied 32-byte seed — the same seed always
//! yields the same keypair, and no backend touches an OS randomness source.
//! Sign/verify operate on canonically-serialized byte strings only, so
//! signatures are reproducible across implementations.
//!
//! Secret key material lives in [`SecretKey`], which zeroizes in place on
//! [`Zeroize::zeroize`] and on drop. Zeroization requires `&mut` — an
//! immutable handle cannot be passed to it, the compiler rejects the call —
//! and [`with_secret`] scopes a keypair so cleanup runs on every exit path.

use crate::hash::{sha256_domain, HASH_SCHEME_PUBKEY_DOMAIN_V1, HASH_SCHEME_SIG_DOMAIN_V1};
use crate::{CertrailError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Required keygen seed length in bytes.
pub const SEED_LEN: usize = 32;

/// Ed25519 signatures are 64 bytes; the hash stand-in produces 32.
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Public verification key (32 bytes for both backends).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Secret key material. Zeroized in place on demand and on drop.
pub struct SecretKey {
    bytes: [u8; 32],
}

impl SecretKey {
    fn from_seed(seed: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = seed
            .try_into()
            .map_err(|_| CertrailError::SeedLength {
                expected: SEED_LEN,
                actual: seed.len(),
            })?;
        Ok(SecretKey { bytes })
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SecretKey(..)")
    }
}

/// Deterministic keygen/sign/verify over canonical byte strings.
pub trait SignatureScheme {
    /// Derive a keypair from a seed of exactly [`SEED_LEN`] bytes; any other
    /// length fails with [`CertrailError::SeedLength`]. Same seed, same
    /// keypair.
    fn keygen(&self, seed: &[u8]) -> Result<(SecretKey, PublicKey)>;

    /// Sign a canonically-serialized message.
    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature. `Ok(false)` means "signature invalid" (including
    /// wrong-length signatures); `Err` means the verification could not be
    /// attempted (malformed key material).
    fn verify(&self, public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Production backend: ed25519-dalek.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn keygen(&self, seed: &[u8]) -> Result<(SecretKey, PublicKey)> {
        let secret = SecretKey::from_seed(seed)?;
        let signing_key = SigningKey::from_bytes(&secret.bytes);
        let public = PublicKey(signing_key.verifying_key().to_bytes());
        Ok((secret, public))
    }

    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from_bytes(&secret.bytes);
        let signature = signing_key.sign(message);
        debug!(len = message.len(), "signed message");
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<bool> {
        let verifying_key = VerifyingKey::from_bytes(&public.0)
            .map_err(|e| CertrailError::Crypto(format!("invalid public key: {e}")))?;

        if signature.len() != ED25519_SIGNATURE_LEN {
            warn!(len = signature.len(), "signature length invalid");
            return Ok(false);
        }
        let mut sig_bytes = [0u8; ED25519_SIGNATURE_LEN];
        sig_bytes.copy_from_slice(signature);
        let signature = Signature::from_bytes(&sig_bytes);

        Ok(verifying_key.verify(message, &signature).is_ok())
    }
}

/// Deterministic SHA-256 stand-in. Not unforgeable; selected only where the
/// real scheme is unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashScheme;

impl HashScheme {
    fn signature_for(public: &PublicKey, message: &[u8]) -> Vec<u8> {
        let mut preimage = Vec::with_capacity(32 + message.len());
        preimage.extend_from_slice(&public.0);
        preimage.extend_from_slice(message);
        sha256_domain(HASH_SCHEME_SIG_DOMAIN_V1, &preimage).0.to_vec()
    }
}

impl SignatureScheme for HashScheme {
    fn keygen(&self, seed: &[u8]) -> Result<(SecretKey, PublicKey)> {
        let secret = SecretKey::from_seed(seed)?;
        let public = PublicKey(sha256_domain(HASH_SCHEME_PUBKEY_DOMAIN_V1, &secret.bytes).0);
        Ok((secret, public))
    }

    fn sign(&self, secret: &SecretKey, message: &[u8]) -> Result<Vec<u8>> {
        let public = PublicKey(sha256_domain(HASH_SCHEME_PUBKEY_DOMAIN_V1, &secret.bytes).0);
        Ok(Self::signature_for(&public, message))
    }

    fn verify(&self, public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(Self::signature_for(public, message) == signature)
    }
}

/// Backend selector; resolved once at process start from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    Ed25519,
    Hash,
}

impl SchemeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeKind::Ed25519 => "ed25519",
            SchemeKind::Hash => "hash",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ed25519" => Ok(SchemeKind::Ed25519),
            "hash" => Ok(SchemeKind::Hash),
            other => Err(CertrailError::Config(format!(
                "unknown signature scheme {other:?}; expected ed25519 or hash"
            ))),
        }
    }

    pub fn instantiate(&self) -> Box<dyn SignatureScheme + Send + Sync> {
        match self {
            SchemeKind::Ed25519 => Box::new(Ed25519Scheme),
            SchemeKind::Hash => Box::new(HashScheme),
        }
    }
}

/// Run `f` with a keypair derived from `seed`, guaranteeing the secret is
/// zeroized on every exit path (return, error, panic-unwind via drop).
pub fn with_secret<T>(
    scheme: &dyn SignatureScheme,
    seed: &[u8],
    f: impl FnOnce(&SecretKey, &PublicKey) -> Result<T>,
) -> Result<T> {
    let (mut secret, public) = scheme.keygen(seed)?;
    let out = f(&secret, &public);
    secret.zeroize();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schemes() -> Vec<(&'static str, Box<dyn SignatureScheme>)> {
        vec![
            ("ed25519", Box::new(Ed25519Scheme)),
            ("hash", Box::new(HashScheme)),
        ]
    }

    #[test]
    fn keygen_is_deterministic_per_seed() {
        for (name, scheme) in schemes() {
            let (_, pk1) = scheme.keygen(&[7u8; 32]).unwrap();
            let (_, pk2) = scheme.keygen(&[7u8; 32]).unwrap();
            let (_, pk3) = scheme.keygen(&[8u8; 32]).unwrap();
            assert_eq!(pk1, pk2, "{name}");
            assert_ne!(pk1, pk3, "{name}");
        }
    }

    #[test]
    fn wrong_seed_length_is_rejected() {
        for (name, scheme) in schemes() {
            for len in [0usize, 16, 31, 33, 64] {
                let err = scheme.keygen(&vec![1u8; len]).unwrap_err();
                assert!(
                    matches!(err, CertrailError::SeedLength { expected: 32, actual } if actual == len),
                    "{name} len {len}"
                );
            }
        }
    }

    #[test]
    fn sign_verify_roundtrip() {
        for (name, scheme) in schemes() {
            let (secret, public) = scheme.keygen(&[1u8; 32]).unwrap();
            let sig = scheme.sign(&secret, b"canonical payload").unwrap();
            assert!(
                scheme.verify(&public, b"canonical payload", &sig).unwrap(),
                "{name}"
            );
            assert!(
                !scheme.verify(&public, b"tampered payload", &sig).unwrap(),
                "{name}"
            );
        }
    }

    #[test]
    fn signatures_are_deterministic() {
        for (name, scheme) in schemes() {
            let (secret, _) = scheme.keygen(&[2u8; 32]).unwrap();
            let s1 = scheme.sign(&secret, b"msg").unwrap();
            let s2 = scheme.sign(&secret, b"msg").unwrap();
            assert_eq!(s1, s2, "{name}");
        }
    }

    #[test]
    fn wrong_length_signature_is_invalid_not_error() {
        for (name, scheme) in schemes() {
            let (_, public) = scheme.keygen(&[3u8; 32]).unwrap();
            let verdict = scheme.verify(&public, b"msg", &[0u8; 7]).unwrap();
            assert!(!verdict, "{name}");
        }
    }

    #[test]
    fn cross_scheme_signatures_never_verify() {
        let seed = [4u8; 32];
        let (ed_secret, ed_public) = Ed25519Scheme.keygen(&seed).unwrap();
        let (hash_secret, hash_public) = HashScheme.keygen(&seed).unwrap();

        let ed_sig = Ed25519Scheme.sign(&ed_secret, b"msg").unwrap();
        let hash_sig = HashScheme.sign(&hash_secret, b"msg").unwrap();

        assert!(!HashScheme.verify(&hash_public, b"msg", &ed_sig).unwrap());
        assert!(!Ed25519Scheme.verify(&ed_public, b"msg", &hash_sig).unwrap());
    }

    #[test]
    fn zeroize_clears_key_material_in_place() {
        let scheme = Ed25519Scheme;
        let (mut secret, _) = scheme.keygen(&[5u8; 32]).unwrap();
        let before = scheme.sign(&secret, b"msg").unwrap();
        secret.zeroize();
        let after = scheme.sign(&secret, b"msg").unwrap();
        // The handle now signs with an all-zero key, not the original one.
        assert_ne!(before, after);
        let (zero_secret, _) = scheme.keygen(&[0u8; 32]).unwrap();
        assert_eq!(after, scheme.sign(&zero_secret, b"msg").unwrap());
    }

    #[test]
    fn with_secret_runs_on_error_paths_too() {
        let out: Result<()> = with_secret(&Ed25519Scheme, &[6u8; 32], |_, _| {
            Err(CertrailError::Validation("caller failure".into()))
        });
        assert!(out.is_err());

        let sig = with_secret(&Ed25519Scheme, &[6u8; 32], |secret, _| {
            Ed25519Scheme.sign(secret, b"msg")
        })
        .unwrap();
        assert_eq!(sig.len(), ED25519_SIGNATURE_LEN);
    }

    #[test]
    fn scheme_kind_parses_and_instantiates() {
        assert_eq!(SchemeKind::parse("ed25519").unwrap(), SchemeKind::Ed25519);
        assert_eq!(SchemeKind::parse("hash").unwrap(), SchemeKind::Hash);
        assert!(SchemeKind::parse("rsa").is_err());

        let scheme = SchemeKind::Hash.instantiate();
        let (_, public) = scheme.keygen(&[9u8; 32]).unwrap();
        assert_eq!(public.0.len(), 32);
    }

    proptest! {
        #[test]
        fn roundtrip_for_random_seeds_and_messages(
            seed in any::<[u8; 32]>(),
            message in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            for (_, scheme) in schemes() {
                let (secret, public) = scheme.keygen(&seed).unwrap();
                let sig = scheme.sign(&secret, &message).unwrap();
                prop_assert!(scheme.verify(&public, &message, &sig).unwrap());
            }
        }
    }
}
