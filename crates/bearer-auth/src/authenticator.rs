//! The bearer-token authenticator.
//!
//! One authentication attempt runs three stages in strict order:
//!
//! ```text
//! Verifying ──► MappingPermissions ──► ApplyingOutcome ──► Admitted
//!     │                 │                     │
//!     └─────────────────┴─────────────────────┴──────────► Denied
//! ```
//!
//! Every per-attempt failure is absorbed here. The broker only learns
//! admit/deny; the reason is logged server-side and counted in metrics.

use crate::claims::BearerClaims;
use crate::config::{AuthConfig, ConfigError};
use crate::errors::AuthError;
use crate::keys::KeyStore;
use crate::observability::metrics::{record_authentication, set_verification_keys};
use crate::permissions::{map_permissions, ResponseDefaults};
use crate::session::{admit, ClientAuthentication};
use crate::verifier::TokenVerifier;
use common::types::IdentityId;
use std::time::Instant;
use tracing::instrument;

/// Authenticates clients presenting RSA-signed bearer tokens.
///
/// Immutable after construction; share it across connection handlers with `Arc`.
#[derive(Debug)]
pub struct BearerAuthenticator {
    verifier: TokenVerifier<KeyStore>,
    response_defaults: ResponseDefaults,
}

impl BearerAuthenticator {
    /// Build the authenticator, loading the configured verification key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSigningKey` if the key cannot be loaded.
    /// The broker must not start in that case.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        let keys = KeyStore::from_pem(&config.signer_public_key_pem)?;
        set_verification_keys(keys.len());

        tracing::info!(
            target: "broker.auth",
            keys = keys.len(),
            response_max_msgs = config.response_defaults.max_msgs,
            response_ttl_secs = config.response_defaults.ttl.as_secs(),
            "Bearer authenticator initialized"
        );

        Ok(Self {
            verifier: TokenVerifier::new(keys),
            response_defaults: config.response_defaults,
        })
    }

    /// Build the authenticator from environment variables.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from loading the configuration or the key.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(&AuthConfig::from_env()?)
    }

    pub fn verifier(&self) -> &TokenVerifier<KeyStore> {
        &self.verifier
    }

    pub fn response_defaults(&self) -> &ResponseDefaults {
        &self.response_defaults
    }

    /// Decide whether to admit `client`.
    ///
    /// On `true` the client holds a fresh identity (and, where supported, a
    /// session deadline). On `false` nothing was installed.
    #[instrument(skip_all)]
    pub fn check(&self, client: &mut dyn ClientAuthentication) -> bool {
        let start = Instant::now();
        let result = self.authenticate(client);
        let duration = start.elapsed();

        match result {
            Ok(identity_id) => {
                tracing::debug!(
                    target: "broker.auth",
                    identity_id = %identity_id,
                    duration_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
                    "Client admitted"
                );
                record_authentication("success", None, duration);
                true
            }
            Err(err) => {
                if err.is_claims_defect() {
                    tracing::warn!(
                        target: "broker.auth",
                        error = ?err,
                        category = err.category(),
                        "Client denied: token claims are structurally invalid"
                    );
                } else {
                    tracing::trace!(
                        target: "broker.auth",
                        error = ?err,
                        category = err.category(),
                        "Client denied"
                    );
                }
                record_authentication("error", Some(err.category()), duration);
                false
            }
        }
    }

    fn authenticate(&self, client: &mut dyn ClientAuthentication) -> Result<IdentityId, AuthError> {
        let claims: BearerClaims = {
            let token = client.bearer_token().ok_or(AuthError::MissingToken)?;
            self.verifier.verify(token)?
        };

        let permissions = map_permissions(&claims, &self.response_defaults)?;

        admit(client, &claims, permissions)
    }
}
