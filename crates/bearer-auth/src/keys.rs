//! Verification key store.
//!
//! Holds the RSA public keys bearer tokens are verified against, indexed by
//! their legacy MD5 SSH fingerprint (`97:3f:d4:…`). Token issuers put that
//! fingerprint in the JWT `kid` header, so resolution is a single map lookup.
//!
//! The store is built once when the authenticator is constructed and is
//! read-only afterwards; there is no rotation path.

use crate::config::ConfigError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use md5::{Digest, Md5};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use std::collections::HashMap;
use std::fmt;

/// Smallest RSA modulus accepted, in bits. Smaller keys cannot verify signatures.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// SSH key type name for RSA keys.
const SSH_RSA_KEY_TYPE: &[u8] = b"ssh-rsa";

/// An RSA public key ready for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    fingerprint: String,
    decoding_key: DecodingKey,
    bits: usize,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("fingerprint", &self.fingerprint)
            .field("bits", &self.bits)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Parse a PEM-encoded RSA public key.
    ///
    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) encodings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSigningKey` if the PEM is not an RSA
    /// public key, the key is smaller than [`MIN_RSA_KEY_BITS`], or its
    /// fingerprint cannot be computed.
    pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
        let pem = pem.trim();
        let public_key = RsaPublicKey::from_public_key_pem(pem).or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                tracing::error!(
                    target: "broker.auth.keys",
                    spki_error = %spki_err,
                    pkcs1_error = %pkcs1_err,
                    "Failed to parse RSA public key PEM"
                );
                ConfigError::InvalidSigningKey(
                    "expected a PEM-encoded RSA public key".to_string(),
                )
            })
        })?;

        Self::from_rsa(&public_key)
    }

    /// Build a verification key from a parsed RSA public key.
    ///
    /// # Errors
    ///
    /// See [`VerificationKey::from_pem`].
    pub fn from_rsa(public_key: &RsaPublicKey) -> Result<Self, ConfigError> {
        let bits = public_key.size() * 8;
        if bits < MIN_RSA_KEY_BITS {
            return Err(ConfigError::InvalidSigningKey(format!(
                "RSA key must be at least {MIN_RSA_KEY_BITS} bits, got {bits}"
            )));
        }

        let modulus = public_key.n().to_bytes_be();
        let exponent = public_key.e().to_bytes_be();

        // A key that cannot be fingerprinted cannot be addressed by `kid`
        let fingerprint = legacy_md5_fingerprint(&exponent, &modulus).ok_or_else(|| {
            ConfigError::InvalidSigningKey("failed to compute key fingerprint".to_string())
        })?;

        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(&modulus),
            &URL_SAFE_NO_PAD.encode(&exponent),
        )
        .map_err(|e| ConfigError::InvalidSigningKey(format!("unusable RSA key: {e}")))?;

        Ok(Self {
            fingerprint,
            decoding_key,
            bits,
        })
    }

    /// Legacy MD5 SSH fingerprint of this key.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Modulus size in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Compute the legacy MD5 SSH fingerprint of an RSA key.
///
/// MD5 over the SSH wire encoding (`string "ssh-rsa"`, `mpint e`, `mpint n`),
/// rendered as colon-separated lowercase hex. This is what
/// `ssh-keygen -l -E md5` prints, without the `MD5:` prefix.
///
/// Returns `None` if a component is too large for the wire encoding.
#[must_use]
pub fn legacy_md5_fingerprint(exponent: &[u8], modulus: &[u8]) -> Option<String> {
    let mut blob = Vec::with_capacity(SSH_RSA_KEY_TYPE.len() + exponent.len() + modulus.len() + 16);
    write_ssh_string(&mut blob, SSH_RSA_KEY_TYPE)?;
    write_ssh_mpint(&mut blob, exponent)?;
    write_ssh_mpint(&mut blob, modulus)?;

    let digest = Md5::digest(&blob);
    Some(
        digest
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

fn write_ssh_string(out: &mut Vec<u8>, bytes: &[u8]) -> Option<()> {
    let len = u32::try_from(bytes.len()).ok()?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Some(())
}

/// Unsigned big-endian integer as an SSH `mpint`: minimal length, with a
/// leading zero byte when the high bit is set.
fn write_ssh_mpint(out: &mut Vec<u8>, magnitude: &[u8]) -> Option<()> {
    let start = magnitude
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(magnitude.len());
    let trimmed = magnitude.get(start..)?;

    match trimmed.first() {
        Some(first) if first & 0x80 != 0 => {
            let len = u32::try_from(trimmed.len().checked_add(1)?).ok()?;
            out.extend_from_slice(&len.to_be_bytes());
            out.push(0);
            out.extend_from_slice(trimmed);
            Some(())
        }
        _ => write_ssh_string(out, trimmed),
    }
}

/// Looks up verification keys by token `kid`.
pub trait KeyResolver: Send + Sync {
    /// Return the key registered under `kid`, if any.
    fn resolve(&self, kid: &str) -> Option<&VerificationKey>;
}

/// Verification keys indexed by fingerprint.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: HashMap<String, VerificationKey>,
}

impl KeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the single key in `pem`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSigningKey` if the key cannot be loaded.
    pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
        let key = VerificationKey::from_pem(pem)?;

        tracing::info!(
            target: "broker.auth.keys",
            fingerprint = %key.fingerprint(),
            bits = key.bits(),
            "Loaded bearer token verification key"
        );

        let mut store = Self::new();
        store.insert(key);
        Ok(store)
    }

    /// Register a key under its own fingerprint, returning any key it replaced.
    pub fn insert(&mut self, key: VerificationKey) -> Option<VerificationKey> {
        self.keys.insert(key.fingerprint.clone(), key)
    }

    /// Look up a key by fingerprint.
    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<&VerificationKey> {
        self.keys.get(fingerprint)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Fingerprints of all registered keys.
    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl KeyResolver for KeyStore {
    fn resolve(&self, kid: &str) -> Option<&VerificationKey> {
        self.get(kid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use auth_test_utils::crypto_fixtures::{escaped_pem, PRIMARY_KEY, ROGUE_KEY};

    #[test]
    fn test_fingerprint_matches_ssh_keygen() {
        let key = VerificationKey::from_pem(PRIMARY_KEY.public_key_pem).unwrap();
        assert_eq!(key.fingerprint(), PRIMARY_KEY.fingerprint);
        assert_eq!(key.bits(), 2048);

        let rogue = VerificationKey::from_pem(ROGUE_KEY.public_key_pem).unwrap();
        assert_eq!(rogue.fingerprint(), ROGUE_KEY.fingerprint);
    }

    #[test]
    fn test_pkcs1_and_spki_share_fingerprint() {
        let spki = VerificationKey::from_pem(PRIMARY_KEY.public_key_pem).unwrap();
        let pkcs1 = VerificationKey::from_pem(PRIMARY_KEY.public_key_pkcs1_pem).unwrap();
        assert_eq!(spki.fingerprint(), pkcs1.fingerprint());
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        let result = VerificationKey::from_pem("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----");
        assert!(matches!(result, Err(ConfigError::InvalidSigningKey(_))));

        assert!(matches!(
            VerificationKey::from_pem(""),
            Err(ConfigError::InvalidSigningKey(_))
        ));
    }

    #[test]
    fn test_from_pem_rejects_private_key() {
        let result = VerificationKey::from_pem(PRIMARY_KEY.private_key_pem);
        assert!(matches!(result, Err(ConfigError::InvalidSigningKey(_))));
    }

    #[test]
    fn test_from_pem_rejects_escaped_newlines() {
        // Normalization is the config layer's job
        let result = VerificationKey::from_pem(&escaped_pem(PRIMARY_KEY.public_key_pem));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_rsa_rejects_small_keys() {
        let n = rsa::BigUint::from_bytes_be(&[0xC5; 128]);
        let e = rsa::BigUint::from(65_537_u32);
        let small = RsaPublicKey::new_unchecked(n, e);

        let result = VerificationKey::from_rsa(&small);
        assert!(matches!(result, Err(ConfigError::InvalidSigningKey(ref msg)) if msg.contains("2048")));
    }

    #[test]
    fn test_mpint_encoding() {
        let mut out = Vec::new();
        write_ssh_mpint(&mut out, &[0x00, 0x01, 0x00, 0x01]).unwrap();
        assert_eq!(out, vec![0, 0, 0, 3, 0x01, 0x00, 0x01]);

        let mut out = Vec::new();
        write_ssh_mpint(&mut out, &[0x80]).unwrap();
        assert_eq!(out, vec![0, 0, 0, 2, 0x00, 0x80]);

        let mut out = Vec::new();
        write_ssh_mpint(&mut out, &[0x00]).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_fingerprint_format() {
        let fingerprint = legacy_md5_fingerprint(&[1, 0, 1], &[0xAB; 256]).unwrap();
        assert_eq!(fingerprint.len(), 16 * 2 + 15);
        assert_eq!(fingerprint.matches(':').count(), 15);
        assert_eq!(fingerprint, fingerprint.to_lowercase());
    }

    #[test]
    fn test_store_from_pem_indexes_by_fingerprint() {
        let store = KeyStore::from_pem(PRIMARY_KEY.public_key_pem).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get(PRIMARY_KEY.fingerprint).is_some());
        assert!(store.resolve(ROGUE_KEY.fingerprint).is_none());
        assert_eq!(store.fingerprints().collect::<Vec<_>>(), vec![PRIMARY_KEY.fingerprint]);
    }

    #[test]
    fn test_store_insert_replaces_same_key() {
        let mut store = KeyStore::new();
        assert!(store.is_empty());

        let key = VerificationKey::from_pem(PRIMARY_KEY.public_key_pem).unwrap();
        assert!(store.insert(key.clone()).is_none());
        assert!(store.insert(key).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_debug_shows_fingerprint_only() {
        let key = VerificationKey::from_pem(PRIMARY_KEY.public_key_pem).unwrap();
        let debug_str = format!("{key:?}");
        assert!(debug_str.contains(PRIMARY_KEY.fingerprint));
    }
}
