//! Mock client contexts
//!
//! [`MockClient`] stands in for the broker's connection types. It can expose
//! the session-expiration capability (like a network connection) or not (like
//! an internal/synthetic client), and records everything the authenticator
//! installs on it.

use bearer_auth::permissions::Permissions;
use bearer_auth::session::{
    ClientAuthentication, EphemeralIdentity, ExpirationDeadline, SessionExpiration,
};

/// Recording client context for authenticator tests
#[derive(Debug, Default)]
pub struct MockClient {
    token: Option<String>,
    supports_expiration: bool,
    identity: Option<EphemeralIdentity>,
    deadline: Option<ExpirationDeadline>,
    registrations: usize,
}

impl MockClient {
    /// A network-connection-like client: `exp` is enforced
    pub fn connection(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            supports_expiration: true,
            ..Self::default()
        }
    }

    /// An internal client without the expiration capability
    pub fn internal(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            supports_expiration: false,
            ..Self::default()
        }
    }

    /// A connection that presented no token
    pub fn without_token() -> Self {
        Self {
            supports_expiration: true,
            ..Self::default()
        }
    }

    pub fn identity(&self) -> Option<&EphemeralIdentity> {
        self.identity.as_ref()
    }

    pub fn deadline(&self) -> Option<ExpirationDeadline> {
        self.deadline
    }

    /// Number of times an identity was registered
    pub fn registrations(&self) -> usize {
        self.registrations
    }

    /// Permissions of the registered identity
    ///
    /// # Panics
    ///
    /// Panics if no identity was registered.
    pub fn permissions(&self) -> &Permissions {
        &self
            .identity
            .as_ref()
            .expect("Client should have a registered identity")
            .permissions
    }
}

impl ClientAuthentication for MockClient {
    fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn register_identity(&mut self, identity: EphemeralIdentity) {
        self.registrations += 1;
        self.identity = Some(identity);
    }

    fn session_expiration(&mut self) -> Option<&mut dyn SessionExpiration> {
        if self.supports_expiration {
            Some(self)
        } else {
            None
        }
    }
}

impl SessionExpiration for MockClient {
    fn set_session_expiration(&mut self, deadline: ExpirationDeadline) {
        self.deadline = Some(deadline);
    }
}
