//! Common utilities and types shared across the broker's auth components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, unverified header inspection)
pub mod jwt;
