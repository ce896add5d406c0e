//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for mapped permissions.

use bearer_auth::permissions::{Permissions, ResponseDefaults};
use std::time::Duration;

/// Custom assertions for a connection's permissions
///
/// # Example
/// ```rust,ignore
/// client.permissions()
///     .assert_publish_allow(&["orders.*"])
///     .assert_publish_deny(&[])
///     .assert_no_subscribe_access()
///     .assert_default_responses();
/// ```
pub trait PermissionAssertions {
    /// Assert the exact publish allow list
    fn assert_publish_allow(&self, subjects: &[&str]) -> &Self;

    /// Assert the exact publish deny list
    fn assert_publish_deny(&self, subjects: &[&str]) -> &Self;

    /// Assert the exact subscribe allow list
    fn assert_subscribe_allow(&self, subjects: &[&str]) -> &Self;

    /// Assert the exact subscribe deny list
    fn assert_subscribe_deny(&self, subjects: &[&str]) -> &Self;

    /// Assert that both subscribe lists are empty
    fn assert_no_subscribe_access(&self) -> &Self;

    /// Assert the response quota
    fn assert_responses(&self, max: u64, ttl: Duration) -> &Self;

    /// Assert the built-in response defaults
    fn assert_default_responses(&self) -> &Self;
}

fn owned(subjects: &[&str]) -> Vec<String> {
    subjects.iter().map(ToString::to_string).collect()
}

impl PermissionAssertions for Permissions {
    fn assert_publish_allow(&self, subjects: &[&str]) -> &Self {
        assert_eq!(self.publish.allow, owned(subjects), "publish.allow mismatch");
        self
    }

    fn assert_publish_deny(&self, subjects: &[&str]) -> &Self {
        assert_eq!(self.publish.deny, owned(subjects), "publish.deny mismatch");
        self
    }

    fn assert_subscribe_allow(&self, subjects: &[&str]) -> &Self {
        assert_eq!(self.subscribe.allow, owned(subjects), "subscribe.allow mismatch");
        self
    }

    fn assert_subscribe_deny(&self, subjects: &[&str]) -> &Self {
        assert_eq!(self.subscribe.deny, owned(subjects), "subscribe.deny mismatch");
        self
    }

    fn assert_no_subscribe_access(&self) -> &Self {
        self.assert_subscribe_allow(&[]).assert_subscribe_deny(&[])
    }

    fn assert_responses(&self, max: u64, ttl: Duration) -> &Self {
        assert_eq!(self.responses.max, max, "responses.max mismatch");
        assert_eq!(self.responses.ttl, ttl, "responses.ttl mismatch");
        self
    }

    fn assert_default_responses(&self) -> &Self {
        let defaults = ResponseDefaults::default();
        self.assert_responses(defaults.max_msgs, defaults.ttl)
    }
}
