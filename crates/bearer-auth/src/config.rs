//! Bearer authenticator configuration.
//!
//! Configuration is loaded from environment variables. The signing public key
//! is required; the broker must not start without it.

use crate::permissions::ResponseDefaults;
use common::jwt::normalize_escaped_newlines;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the PEM-encoded RSA verification key.
pub const SIGNER_PUBLIC_KEY_VAR: &str = "JWT_SIGNER_PUBLIC_KEY";

/// Environment variable overriding the default response message quota.
pub const RESPONSE_MAX_MSGS_VAR: &str = "BEARER_AUTH_RESPONSE_MAX_MSGS";

/// Environment variable overriding the default response TTL (seconds).
pub const RESPONSE_TTL_SECONDS_VAR: &str = "BEARER_AUTH_RESPONSE_TTL_SECONDS";

/// Bearer authenticator configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// PEM-encoded RSA public key (escaped newlines already normalized).
    pub signer_public_key_pem: String,

    /// Response permissions applied when a token omits the `responses` group.
    pub response_defaults: ResponseDefaults,
}

/// Custom Debug implementation that abbreviates the key material.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "signer_public_key_pem",
                &format_args!("<{} bytes>", self.signer_public_key_pem.len()),
            )
            .field("response_defaults", &self.response_defaults)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT signing key: {0}")]
    InvalidSigningKey(String),

    #[error("Invalid response permission defaults: {0}")]
    InvalidResponseDefaults(String),
}

impl AuthConfig {
    /// Build a configuration from a PEM key with the default response permissions.
    #[must_use]
    pub fn new(signer_public_key_pem: impl Into<String>) -> Self {
        Self {
            signer_public_key_pem: normalize_escaped_newlines(&signer_public_key_pem.into()),
            response_defaults: ResponseDefaults::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw_pem = vars
            .get(SIGNER_PUBLIC_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(SIGNER_PUBLIC_KEY_VAR.to_string()))?;

        let mut response_defaults = ResponseDefaults::default();

        if let Some(value_str) = vars.get(RESPONSE_MAX_MSGS_VAR) {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidResponseDefaults(format!(
                    "{RESPONSE_MAX_MSGS_VAR} must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidResponseDefaults(format!(
                    "{RESPONSE_MAX_MSGS_VAR} must be greater than 0"
                )));
            }

            response_defaults.max_msgs = value;
        }

        if let Some(value_str) = vars.get(RESPONSE_TTL_SECONDS_VAR) {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidResponseDefaults(format!(
                    "{RESPONSE_TTL_SECONDS_VAR} must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidResponseDefaults(format!(
                    "{RESPONSE_TTL_SECONDS_VAR} must be greater than 0"
                )));
            }

            response_defaults.ttl = Duration::from_secs(value);
        }

        Ok(AuthConfig {
            signer_public_key_pem: normalize_escaped_newlines(raw_pem),
            response_defaults,
        })
    }
}
