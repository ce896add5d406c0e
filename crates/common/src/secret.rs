//! Secret types for protecting bearer tokens from accidental logging.
//!
//! Re-exports the [`secrecy`] types. A client's bearer token travels through
//! connection setup as a [`SecretString`], so any struct that derives `Debug`
//! while holding one prints `[REDACTED]` instead of the credential.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ConnectOptions {
//!     name: String,
//!     bearer_token: SecretString,
//! }
//!
//! let opts = ConnectOptions {
//!     name: "orders-worker".to_string(),
//!     bearer_token: SecretString::from("eyJhbGciOiJSUzI1NiJ9.e30.sig"),
//! };
//!
//! assert!(!format!("{opts:?}").contains("eyJhbGci"));
//! let _token: &str = opts.bearer_token.expose_secret();
//! ```
//!
//! Only the verifier should call `expose_secret()` on a bearer token.

pub use secrecy::{ExposeSecret, SecretString};
