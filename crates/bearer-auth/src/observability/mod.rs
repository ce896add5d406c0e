//! Observability for bearer authentication.
//!
//! # Privacy by Default
//!
//! Entry points use `#[instrument(skip_all)]` and log an explicit allow-list
//! of fields:
//! - **SAFE**: outcome, error category, algorithm, key fingerprint, durations
//! - **NEVER**: bearer tokens, the `sub` claim, permission subjects
//!
//! Metric labels are bounded (see [`metrics`]).

pub mod metrics;

pub use metrics::{record_authentication, record_session_expired, set_verification_keys};
