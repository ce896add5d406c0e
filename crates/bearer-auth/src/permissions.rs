//! Claims-to-permissions mapping.
//!
//! A verified token's `permissions` claim is decoded into [`PermissionsClaim`],
//! where every group and field is optional. [`map_permissions`] turns it into
//! a [`Permissions`] policy in which every group is present:
//!
//! - missing `publish` / `subscribe` → empty allow and empty deny lists
//!   (no implicit access)
//! - missing `responses` → the process-wide [`ResponseDefaults`]
//!
//! A token without a `permissions` claim is rejected outright.

use crate::claims::BearerClaims;
use crate::errors::AuthError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of replies a responder may send per request.
pub const DEFAULT_RESPONSE_MAX_MSGS: u64 = 1;

/// Default window during which replies are allowed (2 minutes).
pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(120);

/// Process-wide response permission defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDefaults {
    /// Maximum in-flight replies per request.
    pub max_msgs: u64,
    /// Reply time-to-live.
    pub ttl: Duration,
}

impl Default for ResponseDefaults {
    fn default() -> Self {
        Self {
            max_msgs: DEFAULT_RESPONSE_MAX_MSGS,
            ttl: DEFAULT_RESPONSE_TTL,
        }
    }
}

// =============================================================================
// Claim shapes (as carried in the token)
// =============================================================================

/// Allow/deny subject lists as they appear in the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPermissionClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
}

/// Response permission as it appears in the token.
///
/// `ttl` is in nanoseconds, matching the broker's permission wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePermissionClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// The `permissions` claim, with every group optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsClaim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<SubjectPermissionClaim>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<SubjectPermissionClaim>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<ResponsePermissionClaim>,
}

// =============================================================================
// Normalized policy
// =============================================================================

/// Allow/deny subject lists. Empty lists grant nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectPermission {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// Reply quota granted to a responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePermission {
    pub max: u64,
    pub ttl: Duration,
}

/// Fully populated permissions policy for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions {
    pub publish: SubjectPermission,
    pub subscribe: SubjectPermission,
    pub responses: ResponsePermission,
}

impl SubjectPermissionClaim {
    fn with_defaults(&self) -> SubjectPermission {
        SubjectPermission {
            allow: self.allow.clone().unwrap_or_default(),
            deny: self.deny.clone().unwrap_or_default(),
        }
    }
}

impl ResponsePermissionClaim {
    fn with_defaults(&self, defaults: &ResponseDefaults) -> ResponsePermission {
        ResponsePermission {
            max: self.max.unwrap_or(defaults.max_msgs),
            ttl: self.ttl.map_or(defaults.ttl, Duration::from_nanos),
        }
    }
}

impl PermissionsClaim {
    /// Fill every omitted group and field, producing a complete policy.
    #[must_use]
    pub fn with_defaults(&self, defaults: &ResponseDefaults) -> Permissions {
        Permissions {
            publish: self
                .publish
                .as_ref()
                .map(SubjectPermissionClaim::with_defaults)
                .unwrap_or_default(),
            subscribe: self
                .subscribe
                .as_ref()
                .map(SubjectPermissionClaim::with_defaults)
                .unwrap_or_default(),
            responses: self.responses.as_ref().map_or(
                ResponsePermission {
                    max: defaults.max_msgs,
                    ttl: defaults.ttl,
                },
                |responses| responses.with_defaults(defaults),
            ),
        }
    }
}

impl From<&Permissions> for PermissionsClaim {
    fn from(permissions: &Permissions) -> Self {
        let subject = |p: &SubjectPermission| SubjectPermissionClaim {
            allow: Some(p.allow.clone()),
            deny: Some(p.deny.clone()),
        };

        Self {
            publish: Some(subject(&permissions.publish)),
            subscribe: Some(subject(&permissions.subscribe)),
            responses: Some(ResponsePermissionClaim {
                max: Some(permissions.responses.max),
                ttl: Some(
                    u64::try_from(permissions.responses.ttl.as_nanos()).unwrap_or(u64::MAX),
                ),
            }),
        }
    }
}

/// Derive the connection's permissions from verified claims.
///
/// # Errors
///
/// Returns `AuthError::MissingPermissions` when the claims carry no
/// `permissions` claim. An authenticated but policy-less token is not admitted.
pub fn map_permissions(
    claims: &BearerClaims,
    defaults: &ResponseDefaults,
) -> Result<Permissions, AuthError> {
    let Some(claim) = claims.permissions.as_ref() else {
        return Err(AuthError::MissingPermissions);
    };

    let permissions = claim.with_defaults(defaults);

    tracing::trace!(
        target: "broker.auth.permissions",
        publish_defaulted = claim.publish.is_none(),
        subscribe_defaulted = claim.subscribe.is_none(),
        responses_defaulted = claim.responses.is_none(),
        "Mapped permissions claim"
    );

    Ok(permissions)
}
