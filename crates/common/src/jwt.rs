//! JWT utilities shared by the broker's auth components.
//!
//! This module provides the pre-verification steps of bearer token handling:
//! - Size limits for DoS prevention
//! - Unverified header inspection (`alg` and `kid`) so that the algorithm
//!   allow-list and key lookup can run before any cryptography
//! - Normalization of PEM material delivered through environment variables
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by [`peek_header`] is trusted; it only selects the
//!   verification path, and the signature MUST still be checked
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::peek_header;
//!
//! let header = peek_header(token)?;
//! if !ACCEPTED_ALGORITHMS.contains(&header.alg.as_str()) {
//!     return Err(...);
//! }
//! let kid = header.kid.ok_or(...)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Bearer tokens larger than this are rejected BEFORE any base64 decoding or
/// signature verification. A typical RS256 token with a permissions claim is
/// well under 2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT before verification.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The bearer token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The bearer token is invalid or expired")]
    MalformedToken,
}

// =============================================================================
// Header Types
// =============================================================================

/// The untrusted subset of a JWT header needed to pick a verification path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Declared signing algorithm, exactly as written in the header.
    pub alg: String,

    /// Key identifier. `None` when absent, empty, or not a string.
    pub kid: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<serde_json::Value>,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode a JWT header without verifying the signature.
///
/// The `alg` is returned as a plain string so that algorithms the JWT library
/// does not know about (e.g. `none`) are reported verbatim instead of
/// collapsing into a parse failure.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The `kid` value should only be used for key lookup in a trusted key store
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong number of parts, bad base64, invalid JSON, or
///   no string `alg` field
pub fn peek_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    // Only a non-empty string counts as a key identifier
    let kid = header
        .kid
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(UnverifiedHeader {
        alg: header.alg,
        kid,
    })
}

/// Replace literal `\n` escape sequences with real newlines.
///
/// PEM keys injected through environment variables frequently arrive on a
/// single line with the newlines escaped.
#[must_use]
pub fn normalize_escaped_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

// =============================================================================
// Tests
// =============================================================================
