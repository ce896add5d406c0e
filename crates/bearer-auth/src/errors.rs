//! Per-attempt authentication errors.
//!
//! None of these cross the authenticator boundary: [`crate::BearerAuthenticator::check`]
//! logs the reason server-side and reports only admit/deny to the broker.
//! Display strings are intentionally generic so that, if one is ever surfaced,
//! it does not reveal which verification step failed.

use thiserror::Error;

/// Reason an authentication attempt was denied.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// The client presented no bearer token at all.
    #[error("The bearer token is invalid or expired")]
    MissingToken,

    /// The token exceeds the maximum accepted size.
    #[error("The bearer token is invalid or expired")]
    TokenTooLarge,

    /// The token is not a well-formed compact JWT.
    #[error("The bearer token is invalid or expired")]
    MalformedToken,

    /// The header declares a signing algorithm outside the accepted family.
    #[error("The bearer token is invalid or expired")]
    UnsupportedAlgorithm(String),

    /// The header carries no usable `kid`.
    #[error("The bearer token is invalid or expired")]
    MissingKeyId,

    /// The `kid` does not name any loaded verification key.
    #[error("The bearer token is invalid or expired")]
    UnknownKeyId(String),

    /// The signature does not verify under the resolved key.
    #[error("The bearer token is invalid or expired")]
    InvalidSignature,

    /// The signature verified but the claims could not be decoded.
    ///
    /// Only the position and kind of the decode failure are kept; decoder
    /// messages quote claim values.
    #[error("The bearer token is invalid or expired")]
    InvalidClaims {
        /// Decode failure kind (`syntax`, `data`, `eof` or `io`).
        kind: &'static str,
        line: usize,
        column: usize,
    },

    /// The verified claims carry no `permissions` claim.
    #[error("The bearer token does not grant any permissions")]
    MissingPermissions,

    /// No `exp` claim on a connection that enforces session expiration.
    #[error("The bearer token is invalid or expired")]
    MissingExpiration,

    /// The `exp` claim is neither a number nor a decimal string.
    #[error("The bearer token is invalid or expired")]
    MalformedExpiration,

    /// The `nbf` or `iat` instant is after the current time.
    #[error("The bearer token is invalid or expired")]
    NotYetValid,

    /// The `exp` instant is at or before the current time.
    #[error("The bearer token is invalid or expired")]
    Expired {
        /// Expiration from the token (Unix seconds).
        exp: i64,
        /// Time of the check (Unix seconds).
        now: i64,
    },
}

impl AuthError {
    /// Bounded label for metrics and log grouping.
    ///
    /// - `verification`: token could not be verified
    /// - `policy`: token verified but its claims do not yield a policy
    /// - `expiration`: the token's validity window does not include now
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            AuthError::MissingToken
            | AuthError::TokenTooLarge
            | AuthError::MalformedToken
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::MissingKeyId
            | AuthError::UnknownKeyId(_)
            | AuthError::InvalidSignature => "verification",
            AuthError::InvalidClaims { .. } | AuthError::MissingPermissions => "policy",
            AuthError::NotYetValid
            | AuthError::MissingExpiration
            | AuthError::MalformedExpiration
            | AuthError::Expired { .. } => "expiration",
        }
    }

    /// Whether the failure points at a structurally broken token issuer
    /// rather than an ordinary bad or stale credential.
    ///
    /// These are logged at warn level; everything else at trace.
    #[must_use]
    pub fn is_claims_defect(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidClaims { .. } | AuthError::MissingPermissions
        )
    }
}
