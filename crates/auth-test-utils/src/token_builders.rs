//! Builder patterns for test tokens
//!
//! Provides a fluent API for minting signed bearer tokens, including the
//! malformed and hostile variants the verifier must reject.

use crate::crypto_fixtures::{TestKeyPair, EC_P256_PRIVATE_KEY_PEM, HMAC_TEST_SECRET, PRIMARY_KEY};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for signed test bearer tokens
///
/// Defaults: signed RS256 by [`PRIMARY_KEY`] with its fingerprint as `kid`,
/// an empty `permissions` claim, and `exp` one hour from now.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .with_permissions(json!({ "publish": { "allow": ["orders.*"] } }))
///     .expires_in(60)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: Option<String>,
    exp: Option<Value>,
    nbf: Option<Value>,
    iat: Option<Value>,
    permissions: Option<Value>,
    kid: Option<String>,
    algorithm: Algorithm,
    key: TestKeyPair,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        Self {
            sub: Some("test-client".to_string()),
            exp: Some(json!((Utc::now() + Duration::seconds(3600)).timestamp())),
            nbf: None,
            iat: None,
            permissions: Some(json!({})),
            kid: Some(PRIMARY_KEY.fingerprint.to_string()),
            algorithm: Algorithm::RS256,
            key: PRIMARY_KEY,
        }
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Set the `permissions` claim
    pub fn with_permissions(mut self, permissions: Value) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Omit the `permissions` claim
    pub fn without_permissions(mut self) -> Self {
        self.permissions = None;
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some(json!((Utc::now() + Duration::seconds(seconds)).timestamp()));
        self
    }

    /// Set the raw `exp` value (string, float, bool, ...)
    pub fn with_exp(mut self, exp: Value) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Omit the `exp` claim
    pub fn without_exp(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set `nbf` in seconds from now
    pub fn not_before(mut self, seconds: i64) -> Self {
        self.nbf = Some(json!((Utc::now() + Duration::seconds(seconds)).timestamp()));
        self
    }

    /// Set `iat` in seconds from now
    pub fn issued_at(mut self, seconds: i64) -> Self {
        self.iat = Some(json!((Utc::now() + Duration::seconds(seconds)).timestamp()));
        self
    }

    /// Set the `kid` header
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Omit the `kid` header
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Sign with `key`, announcing its own fingerprint as `kid`
    pub fn signed_by(mut self, key: TestKeyPair) -> Self {
        self.key = key;
        self.kid = Some(key.fingerprint.to_string());
        self
    }

    /// Sign with `key` while keeping the current `kid`
    pub fn forged_with(mut self, key: TestKeyPair) -> Self {
        self.key = key;
        self
    }

    /// Set the signing algorithm
    ///
    /// `HS*` tokens are signed with [`HMAC_TEST_SECRET`], `ES256` with the EC
    /// fixture key, and RSA algorithms with the configured key pair.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> Value {
        let mut claims = Map::new();
        if let Some(sub) = &self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        if let Some(exp) = &self.exp {
            claims.insert("exp".to_string(), exp.clone());
        }
        if let Some(nbf) = &self.nbf {
            claims.insert("nbf".to_string(), nbf.clone());
        }
        if let Some(iat) = &self.iat {
            claims.insert("iat".to_string(), iat.clone());
        }
        if let Some(permissions) = &self.permissions {
            claims.insert("permissions".to_string(), permissions.clone());
        }
        Value::Object(claims)
    }

    /// Sign and encode the token
    pub fn build(self) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = self.kid.clone();

        let key = match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                EncodingKey::from_secret(HMAC_TEST_SECRET)
            }
            Algorithm::ES256 => EncodingKey::from_ec_pem(EC_P256_PRIVATE_KEY_PEM.as_bytes())
                .expect("EC fixture key should load"),
            _ => EncodingKey::from_rsa_pem(self.key.private_key_pem.as_bytes())
                .expect("RSA fixture key should load"),
        };

        encode(&header, &self.claims(), &key).expect("Token encoding should succeed")
    }

    /// Build an unsigned `alg: none` token carrying the same claims
    pub fn build_unsigned(self) -> String {
        let mut header = json!({ "alg": "none", "typ": "JWT" });
        if let Some(kid) = &self.kid {
            header["kid"] = json!(kid);
        }

        format!(
            "{}.{}.",
            encode_part(&header),
            encode_part(&self.claims())
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_part(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("JSON should serialize"))
}

/// Decode a token's payload without verifying it
pub fn decode_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).expect("JWT should have a payload");
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .expect("JWT payload should be base64url");
    serde_json::from_slice(&bytes).expect("JWT payload should be JSON")
}

/// Decode a token's header without verifying it
pub fn decode_header(token: &str) -> Value {
    let header = token.split('.').next().expect("JWT should have a header");
    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .expect("JWT header should be base64url");
    serde_json::from_slice(&bytes).expect("JWT header should be JSON")
}
