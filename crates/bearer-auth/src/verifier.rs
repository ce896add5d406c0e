//! Bearer token verification.
//!
//! Verification order matters: every check that needs no cryptography runs
//! first, and no key is looked up until the header declares an accepted
//! algorithm and a `kid`.
//!
//! 1. size limit (before any decoding)
//! 2. unverified header peek
//! 3. algorithm allow-list
//! 4. `kid` presence
//! 5. key resolution by `kid` (never "try every key")
//! 6. signature verification pinned to the allowed algorithm
//! 7. typed claim decoding
//! 8. `nbf` and `iat` must not lie in the future
//!
//! Expiration is NOT checked here. How `exp` is enforced depends on the kind
//! of client, which only the session stage knows.

use crate::claims::BearerClaims;
use crate::errors::AuthError;
use crate::keys::{KeyResolver, KeyStore};
use chrono::Utc;
use common::jwt::{peek_header, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::error::Category;
use std::str::FromStr;
use tracing::instrument;

/// Signing algorithms a bearer token may declare.
///
/// RSA PKCS#1 v1.5 only. Symmetric (`HS*`), elliptic-curve (`ES*`, `EdDSA`),
/// RSA-PSS (`PS*`) and `none` are all rejected before key lookup.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Verifies bearer tokens against a read-only set of keys.
#[derive(Debug)]
pub struct TokenVerifier<R = KeyStore> {
    keys: R,
}

impl<R: KeyResolver> TokenVerifier<R> {
    /// Create a verifier over `keys`.
    pub fn new(keys: R) -> Self {
        Self { keys }
    }

    /// The key resolver backing this verifier.
    pub fn keys(&self) -> &R {
        &self.keys
    }

    /// Verify `token` and decode its claims.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing step. `exp` is not
    /// evaluated; a future `nbf` or `iat` is [`AuthError::NotYetValid`].
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<BearerClaims, AuthError> {
        let header = peek_header(token).map_err(|e| match e {
            JwtValidationError::TokenTooLarge => AuthError::TokenTooLarge,
            JwtValidationError::MalformedToken => AuthError::MalformedToken,
        })?;

        let algorithm = accepted_algorithm(&header.alg).ok_or_else(|| {
            tracing::trace!(target: "broker.auth.jwt", alg = %header.alg, "Token rejected: algorithm not accepted");
            AuthError::UnsupportedAlgorithm(header.alg.clone())
        })?;

        let kid = header.kid.ok_or_else(|| {
            tracing::trace!(target: "broker.auth.jwt", "Token rejected: no key id in header");
            AuthError::MissingKeyId
        })?;

        let key = self.keys.resolve(&kid).ok_or_else(|| {
            tracing::trace!(target: "broker.auth.jwt", kid = %kid, "Token rejected: unknown key id");
            AuthError::UnknownKeyId(kid.clone())
        })?;

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data =
            decode::<BearerClaims>(token, key.decoding_key(), &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => {
                        tracing::trace!(target: "broker.auth.jwt", kid = %kid, "Token rejected: signature mismatch");
                        AuthError::InvalidSignature
                    }
                    // Claims are only decoded once the signature has verified
                    ErrorKind::Json(err) => {
                        let kind = json_error_kind(err.classify());
                        tracing::trace!(
                            target: "broker.auth.jwt",
                            kid = %kid,
                            kind,
                            line = err.line(),
                            column = err.column(),
                            "Token rejected: claims do not decode"
                        );
                        AuthError::InvalidClaims {
                            kind,
                            line: err.line(),
                            column: err.column(),
                        }
                    }
                    _ => {
                        tracing::trace!(target: "broker.auth.jwt", error = %e, "Token rejected: malformed");
                        AuthError::MalformedToken
                    }
                }
            })?;

        check_validity_start(&token_data.claims, Utc::now().timestamp()).map_err(|e| {
            tracing::trace!(target: "broker.auth.jwt", kid = %kid, "Token rejected: not yet valid");
            e
        })?;

        tracing::debug!(
            target: "broker.auth.jwt",
            alg = ?algorithm,
            kid = %kid,
            has_exp = token_data.claims.exp.is_some(),
            has_permissions = token_data.claims.permissions.is_some(),
            "Bearer token verified"
        );

        Ok(token_data.claims)
    }
}

/// Reject a token whose `nbf` or `iat` is after `now`.
///
/// A claim that is absent or does not decode to an instant imposes no bound.
fn check_validity_start(claims: &BearerClaims, now: i64) -> Result<(), AuthError> {
    let starts = [claims.nbf.as_ref(), claims.iat.as_ref()];
    let not_yet_valid = starts
        .into_iter()
        .flatten()
        .filter_map(|instant| instant.unix_seconds().ok())
        .any(|start| start > now);

    if not_yet_valid {
        Err(AuthError::NotYetValid)
    } else {
        Ok(())
    }
}

fn json_error_kind(category: Category) -> &'static str {
    match category {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

fn accepted_algorithm(alg: &str) -> Option<Algorithm> {
    Algorithm::from_str(alg)
        .ok()
        .filter(|algorithm| ACCEPTED_ALGORITHMS.contains(algorithm))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::keys::VerificationKey;
    use auth_test_utils::crypto_fixtures::{
        EC_P256_PRIVATE_KEY_PEM, HMAC_TEST_SECRET, PRIMARY_KEY, ROGUE_KEY,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use common::jwt::MAX_JWT_SIZE_BYTES;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Key resolver that counts lookups.
    struct CountingResolver {
        store: KeyStore,
        lookups: AtomicUsize,
    }

    impl KeyResolver for CountingResolver {
        fn resolve(&self, kid: &str) -> Option<&VerificationKey> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.store.resolve(kid)
        }
    }

    fn counting_verifier() -> TokenVerifier<CountingResolver> {
        TokenVerifier::new(CountingResolver {
            store: KeyStore::from_pem(PRIMARY_KEY.public_key_pem).unwrap(),
            lookups: AtomicUsize::new(0),
        })
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(KeyStore::from_pem(PRIMARY_KEY.public_key_pem).unwrap())
    }

    fn claims() -> Value {
        json!({
            "sub": "svc-orders",
            "exp": 4_102_444_800_i64,
            "permissions": { "publish": { "allow": ["orders.*"] } }
        })
    }

    fn sign_with(algorithm: Algorithm, kid: Option<&str>, key: &EncodingKey, claims: &Value) -> String {
        let mut header = Header::new(algorithm);
        header.kid = kid.map(ToString::to_string);
        encode(&header, claims, key).unwrap()
    }

    fn rsa_token(algorithm: Algorithm, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_pem(PRIMARY_KEY.private_key_pem.as_bytes()).unwrap();
        sign_with(algorithm, Some(PRIMARY_KEY.fingerprint), &key, claims)
    }

    fn b64(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_verify_accepts_each_rsa_algorithm() {
        let verifier = verifier();
        for algorithm in [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512] {
            let claims = verifier.verify(&rsa_token(algorithm, &claims())).unwrap();
            assert!(claims.permissions.is_some(), "{algorithm:?} should verify");
            assert_eq!(claims.sub.as_deref(), Some("svc-orders"));
        }
    }

    #[test]
    fn test_verify_does_not_check_expiry() {
        let expired = json!({ "exp": 1, "permissions": {} });
        assert!(verifier().verify(&rsa_token(Algorithm::RS256, &expired)).is_ok());
    }

    #[test]
    fn test_hs256_rejected_before_key_lookup() {
        let verifier = counting_verifier();
        let key = EncodingKey::from_secret(HMAC_TEST_SECRET);
        let token = sign_with(Algorithm::HS256, Some(PRIMARY_KEY.fingerprint), &key, &claims());

        let result = verifier.verify(&token);

        assert_eq!(result.unwrap_err(), AuthError::UnsupportedAlgorithm("HS256".to_string()));
        assert_eq!(verifier.keys().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_es256_rejected_before_key_lookup() {
        let verifier = counting_verifier();
        let key = EncodingKey::from_ec_pem(EC_P256_PRIVATE_KEY_PEM.as_bytes()).unwrap();
        let token = sign_with(Algorithm::ES256, Some(PRIMARY_KEY.fingerprint), &key, &claims());

        assert!(matches!(verifier.verify(&token), Err(AuthError::UnsupportedAlgorithm(_))));
        assert_eq!(verifier.keys().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pss_rejected() {
        let verifier = counting_verifier();
        let token = rsa_token(Algorithm::PS256, &claims());

        assert_eq!(
            verifier.verify(&token).unwrap_err(),
            AuthError::UnsupportedAlgorithm("PS256".to_string())
        );
        assert_eq!(verifier.keys().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_alg_none_rejected() {
        let verifier = counting_verifier();
        let token = format!(
            "{}.{}.",
            b64(&json!({ "alg": "none", "typ": "JWT", "kid": PRIMARY_KEY.fingerprint })),
            b64(&claims())
        );

        assert_eq!(
            verifier.verify(&token).unwrap_err(),
            AuthError::UnsupportedAlgorithm("none".to_string())
        );
        assert_eq!(verifier.keys().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_kid_rejected_even_with_valid_signature() {
        let verifier = counting_verifier();
        let key = EncodingKey::from_rsa_pem(PRIMARY_KEY.private_key_pem.as_bytes()).unwrap();
        let token = sign_with(Algorithm::RS256, None, &key, &claims());

        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::MissingKeyId);
        assert_eq!(verifier.keys().lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let key = EncodingKey::from_rsa_pem(ROGUE_KEY.private_key_pem.as_bytes()).unwrap();
        let token = sign_with(Algorithm::RS256, Some(ROGUE_KEY.fingerprint), &key, &claims());

        assert_eq!(
            verifier().verify(&token).unwrap_err(),
            AuthError::UnknownKeyId(ROGUE_KEY.fingerprint.to_string())
        );
    }

    #[test]
    fn test_rogue_signature_with_our_kid_rejected() {
        let key = EncodingKey::from_rsa_pem(ROGUE_KEY.private_key_pem.as_bytes()).unwrap();
        let token = sign_with(Algorithm::RS256, Some(PRIMARY_KEY.fingerprint), &key, &claims());

        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = rsa_token(Algorithm::RS256, &claims());
        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let forged = b64(&json!({ "exp": 4_102_444_800_i64, "permissions": { "publish": { "allow": [">"] } } }));
        let tampered = format!("{header}.{forged}.{signature}");

        assert_eq!(verifier().verify(&tampered).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_structurally_invalid_claims_after_valid_signature() {
        let bad = json!({ "exp": 4_102_444_800_i64, "permissions": { "publish": { "allow": "orders.*" } } });
        let result = verifier().verify(&rsa_token(Algorithm::RS256, &bad));

        assert!(matches!(result, Err(AuthError::InvalidClaims { kind: "data", .. })));
    }

    #[test]
    fn test_invalid_claims_error_omits_claim_values() {
        let bad = json!({
            "sub": "svc-orders",
            "permissions": { "publish": { "allow": "internal.billing.secret" } }
        });
        let err = verifier().verify(&rsa_token(Algorithm::RS256, &bad)).unwrap_err();

        assert!(err.is_claims_defect());
        assert!(!err.to_string().contains("internal.billing.secret"), "{err}");
        assert!(!format!("{err:?}").contains("internal.billing.secret"), "{err:?}");
    }

    #[test]
    fn test_future_nbf_rejected() {
        let now = Utc::now().timestamp();
        let future = json!({ "nbf": now + 3600, "permissions": {} });
        let past = json!({ "nbf": now - 60, "permissions": {} });

        assert_eq!(
            verifier().verify(&rsa_token(Algorithm::RS256, &future)).unwrap_err(),
            AuthError::NotYetValid
        );
        assert!(verifier().verify(&rsa_token(Algorithm::RS256, &past)).is_ok());
    }

    #[test]
    fn test_future_iat_rejected() {
        let now = Utc::now().timestamp();
        let future = json!({ "iat": (now + 3600) as f64, "permissions": {} });
        let past = json!({ "iat": now - 60, "permissions": {} });

        assert_eq!(
            verifier().verify(&rsa_token(Algorithm::RS256, &future)).unwrap_err(),
            AuthError::NotYetValid
        );
        assert!(verifier().verify(&rsa_token(Algorithm::RS256, &past)).is_ok());
    }

    #[test]
    fn test_validity_start_ignores_undecodable_instants() {
        let claims: BearerClaims =
            serde_json::from_value(json!({ "nbf": true, "iat": { "at": 1 } })).unwrap();
        assert_eq!(check_validity_start(&claims, 1_700_000_000), Ok(()));
    }

    #[test]
    fn test_oversized_token_rejected() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::TokenTooLarge);
    }

    #[test]
    fn test_garbage_rejected() {
        let verifier = verifier();
        for token in ["", "not-a-jwt", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert_eq!(
                verifier.verify(token).unwrap_err(),
                AuthError::MalformedToken,
                "'{token}' should be malformed"
            );
        }
    }

    #[test]
    fn test_accepted_algorithm_lookup() {
        assert_eq!(accepted_algorithm("RS384"), Some(Algorithm::RS384));
        assert_eq!(accepted_algorithm("rs256"), None);
        assert_eq!(accepted_algorithm("EdDSA"), None);
        assert_eq!(accepted_algorithm(""), None);
    }
}
