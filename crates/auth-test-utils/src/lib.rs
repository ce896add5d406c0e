//! # Auth Test Utilities
//!
//! Shared test utilities for bearer-token authentication.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed keys with known fingerprints)
//! - Token builders (TestTokenBuilder)
//! - Mock client contexts (MockClient, with or without session expiration)
//! - Custom assertions (PermissionAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[test]
//! fn test_example() {
//!     let token = TestTokenBuilder::new()
//!         .with_permissions(json!({ "publish": { "allow": ["orders.*"] } }))
//!         .expires_in(60)
//!         .build();
//!
//!     let mut client = MockClient::connection(&token);
//!     assert!(authenticator.check(&mut client));
//!
//!     client.permissions()
//!         .assert_publish_allow(&["orders.*"])
//!         .assert_no_subscribe_access();
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod mock_client;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use mock_client::*;
pub use token_builders::*;
