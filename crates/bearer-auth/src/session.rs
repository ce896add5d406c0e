//! Session outcome: ephemeral identity and expiration deadline.
//!
//! Once a token has been verified and its policy mapped, [`admit`] installs
//! the outcome on the connection. Connections differ in what they support:
//! every connection receives an [`EphemeralIdentity`] and an elapsed `exp` is
//! refused for all of them. Only connections exposing the
//! [`SessionExpiration`] capability require `exp` to be present and get a
//! deadline recorded. Synthetic contexts (internal clients, tests) do not
//! expose the capability.

use crate::claims::{BearerClaims, Expiration};
use crate::errors::AuthError;
use crate::observability::metrics::record_session_expired;
use crate::permissions::Permissions;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{ConnectionId, IdentityId};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Connection abstraction
// =============================================================================

/// What the authenticator needs from a connection being authenticated.
pub trait ClientAuthentication {
    /// The bearer token the client presented, if any.
    fn bearer_token(&self) -> Option<&str>;

    /// Install the identity the connection acts as from now on.
    fn register_identity(&mut self, identity: EphemeralIdentity);

    /// Session-expiration capability, for connections that support it.
    fn session_expiration(&mut self) -> Option<&mut dyn SessionExpiration> {
        None
    }
}

/// Connections that can be closed when their session expires.
pub trait SessionExpiration {
    /// Record the instant after which the session is no longer valid.
    fn set_session_expiration(&mut self, deadline: ExpirationDeadline);
}

/// A connection-scoped principal. Never persisted or shared across connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralIdentity {
    pub id: IdentityId,
    pub permissions: Permissions,
}

impl EphemeralIdentity {
    /// Create a fresh identity carrying `permissions`.
    #[must_use]
    pub fn new(permissions: Permissions) -> Self {
        Self {
            id: IdentityId::new(),
            permissions,
        }
    }
}

/// Absolute instant at which a session expires (whole seconds, UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpirationDeadline(DateTime<Utc>);

impl ExpirationDeadline {
    /// Deadline at `secs` after the Unix epoch. `None` if out of range.
    #[must_use]
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }

    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Whether the session is over at `now`. The deadline itself is expired.
    #[must_use]
    pub fn has_elapsed_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.0
    }

    /// Time left at `now`, zero once elapsed.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.0 - now).to_std().unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Outcome application
// =============================================================================

/// Resolve the session deadline from the `exp` claim, evaluated at `now`.
///
/// # Errors
///
/// - `MissingExpiration` - no `exp` claim
/// - `MalformedExpiration` - `exp` is not a number or decimal string
/// - `Expired` - `now >= exp`
pub fn expiration_deadline(
    exp: Option<&Expiration>,
    now: i64,
) -> Result<ExpirationDeadline, AuthError> {
    let exp = exp.ok_or(AuthError::MissingExpiration)?.unix_seconds()?;

    if now >= exp {
        return Err(AuthError::Expired { exp, now });
    }

    ExpirationDeadline::from_unix_seconds(exp).ok_or(AuthError::MalformedExpiration)
}

/// Install the authentication outcome on `client`, evaluated at the current time.
///
/// # Errors
///
/// See [`admit_at`].
pub fn admit(
    client: &mut dyn ClientAuthentication,
    claims: &BearerClaims,
    permissions: Permissions,
) -> Result<IdentityId, AuthError> {
    admit_at(client, claims, permissions, Utc::now())
}

/// Install the authentication outcome on `client` as of `now`.
///
/// The `exp` claim is checked first; a denied connection is left without an
/// identity. Connections with the expiration capability must carry a
/// decodable `exp`. Other connections are only refused when `exp` decodes to
/// an instant that has passed. On success the identity is registered and,
/// where supported, the deadline recorded.
///
/// # Errors
///
/// - `Expired` - `exp` decodes and `now >= exp`, for every connection
/// - `MissingExpiration`, `MalformedExpiration` - only for connections
///   supporting session expiration
pub fn admit_at(
    client: &mut dyn ClientAuthentication,
    claims: &BearerClaims,
    permissions: Permissions,
    now: DateTime<Utc>,
) -> Result<IdentityId, AuthError> {
    let deadline = if client.session_expiration().is_some() {
        Some(expiration_deadline(claims.exp.as_ref(), now.timestamp())?)
    } else {
        check_not_expired(claims.exp.as_ref(), now.timestamp())?;
        None
    };

    let identity = EphemeralIdentity::new(permissions);
    let identity_id = identity.id;
    client.register_identity(identity);

    if let Some(deadline) = deadline {
        if let Some(expiration) = client.session_expiration() {
            expiration.set_session_expiration(deadline);
        }

        tracing::trace!(
            target: "broker.auth.session",
            identity_id = %identity_id,
            expires_at = deadline.unix_seconds(),
            "Session expiration scheduled"
        );
    }

    Ok(identity_id)
}

/// Refuse an `exp` that decodes to an instant at or before `now`.
///
/// Absent or undecodable values impose no bound.
fn check_not_expired(exp: Option<&Expiration>, now: i64) -> Result<(), AuthError> {
    match exp.map(Expiration::unix_seconds) {
        Some(Ok(exp)) if now >= exp => Err(AuthError::Expired { exp, now }),
        _ => Ok(()),
    }
}

// =============================================================================
// Network connection
// =============================================================================

/// Authentication state of a real client network connection.
///
/// The connection handler owns one of these per socket and closes the socket
/// when [`ClientConnection::cancel_token`] fires.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    bearer_token: Option<SecretString>,
    identity: Option<EphemeralIdentity>,
    expiration: Option<ExpirationDeadline>,
    cancel_token: CancellationToken,
}

impl ClientConnection {
    /// New connection state for a client that presented `bearer_token`.
    #[must_use]
    pub fn new(bearer_token: Option<SecretString>) -> Self {
        Self {
            id: ConnectionId::new(),
            bearer_token,
            identity: None,
            expiration: None,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn identity(&self) -> Option<&EphemeralIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn expiration(&self) -> Option<ExpirationDeadline> {
        self.expiration
    }

    /// Fires when the connection must be closed.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Whether the session is over at `now`. Sessions without a deadline never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration
            .is_some_and(|deadline| deadline.has_elapsed_at(now))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Spawn a task that cancels the connection when its session expires.
    ///
    /// Returns `None` when no deadline is set. The task exits early if the
    /// connection is cancelled for any other reason. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn spawn_expiration_enforcer(&self) -> Option<JoinHandle<()>> {
        let deadline = self.expiration?;
        let remaining = deadline.remaining_at(Utc::now());
        let cancel_token = self.cancel_token.clone();
        let connection_id = self.id;

        Some(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(remaining) => {
                    tracing::info!(
                        target: "broker.auth.session",
                        connection_id = %connection_id,
                        expired_at = deadline.unix_seconds(),
                        "Session expired, closing connection"
                    );
                    record_session_expired();
                    cancel_token.cancel();
                }
                () = cancel_token.cancelled() => {
                    tracing::debug!(
                        target: "broker.auth.session",
                        connection_id = %connection_id,
                        "Connection closed before session expiry"
                    );
                }
            }
        }))
    }
}

impl ClientAuthentication for ClientConnection {
    fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_ref().map(|token| token.expose_secret())
    }

    fn register_identity(&mut self, identity: EphemeralIdentity) {
        self.identity = Some(identity);
    }

    fn session_expiration(&mut self) -> Option<&mut dyn SessionExpiration> {
        Some(self)
    }
}

impl SessionExpiration for ClientConnection {
    fn set_session_expiration(&mut self, deadline: ExpirationDeadline) {
        self.expiration = Some(deadline);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionsClaim, ResponseDefaults};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn permissions() -> Permissions {
        PermissionsClaim::default().with_defaults(&ResponseDefaults::default())
    }

    fn claims(exp: serde_json::Value) -> BearerClaims {
        serde_json::from_value(json!({ "exp": exp, "permissions": {} })).unwrap()
    }

    /// Context without the expiration capability.
    #[derive(Default)]
    struct InternalContext {
        identity: Option<EphemeralIdentity>,
    }

    impl ClientAuthentication for InternalContext {
        fn bearer_token(&self) -> Option<&str> {
            None
        }

        fn register_identity(&mut self, identity: EphemeralIdentity) {
            self.identity = Some(identity);
        }
    }

    #[test]
    fn test_deadline_strictly_after_now() {
        let exp = Expiration::Numeric(NOW as f64);
        assert_eq!(
            expiration_deadline(Some(&exp), NOW),
            Err(AuthError::Expired { exp: NOW, now: NOW })
        );

        let exp = Expiration::Numeric((NOW + 1) as f64);
        assert_eq!(
            expiration_deadline(Some(&exp), NOW).unwrap().unix_seconds(),
            NOW + 1
        );
    }

    #[test]
    fn test_deadline_missing_and_malformed() {
        assert_eq!(
            expiration_deadline(None, NOW),
            Err(AuthError::MissingExpiration)
        );
        assert_eq!(
            expiration_deadline(Some(&Expiration::Unsupported(json!(false))), NOW),
            Err(AuthError::MalformedExpiration)
        );
    }

    #[test]
    fn test_deadline_string_and_number_agree() {
        for exp in [NOW - 1, NOW, NOW + 1] {
            let numeric = expiration_deadline(Some(&Expiration::Numeric(exp as f64)), NOW);
            let text = expiration_deadline(Some(&Expiration::Text(exp.to_string())), NOW);
            assert_eq!(numeric, text);
        }
    }

    #[test]
    fn test_deadline_beyond_calendar_range() {
        let exp = Expiration::Numeric(9.0e18);
        assert_eq!(
            expiration_deadline(Some(&exp), NOW),
            Err(AuthError::MalformedExpiration)
        );
    }

    #[test]
    fn test_admit_connection_sets_identity_and_deadline() {
        let mut connection = ClientConnection::new(None);

        let id = admit_at(&mut connection, &claims(json!(NOW + 60)), permissions(), now()).unwrap();

        assert_eq!(connection.identity().unwrap().id, id);
        assert_eq!(connection.expiration().unwrap().unix_seconds(), NOW + 60);
        assert!(!connection.is_expired_at(now()));
        assert!(connection.is_expired_at(DateTime::from_timestamp(NOW + 60, 0).unwrap()));
    }

    #[test]
    fn test_admit_expired_connection_gets_no_identity() {
        let mut connection = ClientConnection::new(None);

        let result = admit_at(&mut connection, &claims(json!(NOW - 1)), permissions(), now());

        assert!(matches!(result, Err(AuthError::Expired { .. })));
        assert!(connection.identity().is_none());
        assert!(connection.expiration().is_none());
    }

    #[test]
    fn test_admit_internal_context_tolerates_missing_or_malformed_exp() {
        let mut context = InternalContext::default();
        let no_exp: BearerClaims = serde_json::from_value(json!({ "permissions": {} })).unwrap();

        admit_at(&mut context, &no_exp, permissions(), now()).unwrap();
        assert!(context.identity.is_some());

        let mut context = InternalContext::default();
        admit_at(&mut context, &claims(json!(true)), permissions(), now()).unwrap();
        assert!(context.identity.is_some());
    }

    #[test]
    fn test_admit_internal_context_refuses_elapsed_exp() {
        for exp in [json!(NOW - 1), json!(NOW), json!((NOW - 1).to_string())] {
            let mut context = InternalContext::default();

            let result = admit_at(&mut context, &claims(exp.clone()), permissions(), now());

            assert!(matches!(result, Err(AuthError::Expired { .. })), "exp {exp}");
            assert!(context.identity.is_none());
        }

        let mut context = InternalContext::default();
        admit_at(&mut context, &claims(json!(NOW + 1)), permissions(), now()).unwrap();
        assert!(context.identity.is_some());
    }

    #[test]
    fn test_each_admission_gets_fresh_identity() {
        let mut first = ClientConnection::new(None);
        let mut second = ClientConnection::new(None);
        let claims = claims(json!(NOW + 60));

        let a = admit_at(&mut first, &claims, permissions(), now()).unwrap();
        let b = admit_at(&mut second, &claims, permissions(), now()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_remaining_saturates() {
        let deadline = ExpirationDeadline::from_unix_seconds(NOW).unwrap();
        assert_eq!(deadline.remaining_at(now()), Duration::ZERO);

        let later = DateTime::from_timestamp(NOW + 5, 0).unwrap();
        assert_eq!(deadline.remaining_at(later), Duration::ZERO);

        let earlier = DateTime::from_timestamp(NOW - 5, 0).unwrap();
        assert_eq!(deadline.remaining_at(earlier), Duration::from_secs(5));
    }

    #[test]
    fn test_connection_exposes_token() {
        let connection = ClientConnection::new(Some(SecretString::from("a.b.c")));
        assert_eq!(connection.bearer_token(), Some("a.b.c"));

        let debug_str = format!("{connection:?}");
        assert!(!debug_str.contains("a.b.c"));
    }

    #[tokio::test]
    async fn test_enforcer_not_spawned_without_deadline() {
        let connection = ClientConnection::new(None);
        assert!(connection.spawn_expiration_enforcer().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enforcer_stops_when_connection_closes() {
        let mut connection = ClientConnection::new(None);
        let deadline = ExpirationDeadline::from_unix_seconds(Utc::now().timestamp() + 3600).unwrap();
        connection.set_session_expiration(deadline);

        let handle = connection.spawn_expiration_enforcer().unwrap();
        connection.cancel_token().cancel();

        handle.await.unwrap();
        assert!(!connection.is_expired());
    }
}
