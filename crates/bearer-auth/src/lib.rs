//! Bearer-token client authentication for the message broker.
//!
//! Clients authenticate by presenting an RSA-signed JWT. The token's `kid`
//! names the verification key by its legacy MD5 SSH fingerprint, its
//! `permissions` claim becomes the connection's publish/subscribe/response
//! policy, and its `exp` claim bounds the session.
//!
//! # Modules
//!
//! - `authenticator` - The [`BearerAuthenticator`] entry point
//! - `claims` - Typed token payload
//! - `config` - Environment configuration
//! - `errors` - Per-attempt denial reasons
//! - `keys` - Verification key store and fingerprints
//! - `observability` - Metrics
//! - `permissions` - Claims-to-permissions mapping
//! - `session` - Identity and expiration applied to connections
//! - `verifier` - Signature verification
//!
//! # Example
//!
//! ```rust,ignore
//! let authenticator = Arc::new(BearerAuthenticator::from_env()?);
//!
//! // per connection
//! let mut connection = ClientConnection::new(Some(token.into()));
//! if !authenticator.check(&mut connection) {
//!     return Err(ConnectError::AuthorizationViolation);
//! }
//! let _enforcer = connection.spawn_expiration_enforcer();
//! ```

pub mod authenticator;
pub mod claims;
pub mod config;
pub mod errors;
pub mod keys;
pub mod observability;
pub mod permissions;
pub mod session;
pub mod verifier;

pub use authenticator::BearerAuthenticator;
pub use claims::{BearerClaims, Expiration};
pub use config::{AuthConfig, ConfigError};
pub use errors::AuthError;
pub use keys::{KeyResolver, KeyStore, VerificationKey};
pub use permissions::{Permissions, ResponseDefaults, ResponsePermission, SubjectPermission};
pub use session::{
    ClientAuthentication, ClientConnection, EphemeralIdentity, ExpirationDeadline,
    SessionExpiration,
};
pub use verifier::{TokenVerifier, ACCEPTED_ALGORITHMS};
