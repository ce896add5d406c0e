//! Bearer token claims.
//!
//! Only the claims the authenticator acts on are decoded; everything else in
//! the payload is ignored. Every claim is optional at decode time so that an
//! absent claim can be handled by the stage that owns it (policy mapping or
//! expiration) instead of failing signature verification.

use crate::errors::AuthError;
use crate::permissions::PermissionsClaim;
use serde::Deserialize;
use std::fmt;

/// Decoded bearer token payload.
///
/// The `sub` field is redacted in Debug output.
#[derive(Clone, Default, Deserialize)]
pub struct BearerClaims {
    /// Subject, used only for diagnostics.
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration instant.
    #[serde(default)]
    pub exp: Option<Expiration>,

    /// Not-before instant, in the same encodings as `exp`.
    #[serde(default)]
    pub nbf: Option<Expiration>,

    /// Issue instant, in the same encodings as `exp`.
    #[serde(default)]
    pub iat: Option<Expiration>,

    /// Access-control policy.
    #[serde(default)]
    pub permissions: Option<PermissionsClaim>,
}

impl fmt::Debug for BearerClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerClaims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// A NumericDate claim (`exp`, `nbf`, `iat`) in any of the encodings issuers emit.
///
/// Numbers and decimal strings are accepted; anything else is kept so that
/// the expiration stage can reject it explicitly.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    /// Unix seconds as a JSON number (possibly fractional).
    Numeric(f64),
    /// Unix seconds as a decimal string.
    Text(String),
    /// Any other JSON value.
    Unsupported(serde_json::Value),
}

impl Expiration {
    /// Whole Unix seconds of this expiration, truncating any fraction.
    ///
    /// # Errors
    ///
    /// `AuthError::MalformedExpiration` for non-numeric strings, non-finite
    /// values, values outside the `i64` range, and unsupported JSON types.
    pub fn unix_seconds(&self) -> Result<i64, AuthError> {
        let value = match self {
            Expiration::Numeric(value) => *value,
            Expiration::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| AuthError::MalformedExpiration)?,
            Expiration::Unsupported(_) => return Err(AuthError::MalformedExpiration),
        };

        // i64::MAX is not exactly representable; MIN/MAX bound the valid range
        #[allow(clippy::cast_precision_loss)]
        let in_range = value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64;
        if !in_range {
            return Err(AuthError::MalformedExpiration);
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok(value.trunc() as i64)
    }
}
