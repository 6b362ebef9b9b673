//! Error types for the access crate.
//!
//! Domain outcomes are plain enums so callers can match on them:
//! - `AuthenticationError`: establishing who the caller is (OAuth, session)
//! - `AuthorizationError`: mapping an identity to an application user
//! - `InviteError`: presenting and accepting invite tokens
//! - `RoleError` / `UserAdminError`: administrative edits
//!
//! Storage backends return `Report<StoreError>` so context can be layered on
//! with rootcause before a service folds it into a domain outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The authorization code was rejected by the provider (or already used).
    InvalidCode { reason: String },
    /// The CSRF state returned by the provider does not match the pending login.
    StateMismatch,
    /// No pending login was found for the callback.
    MissingPendingLogin,
    /// The ID token failed validation.
    InvalidToken { reason: String },
    /// Provider unreachable or misbehaving.
    ProviderError { provider: String, reason: String },
    /// Missing required claim in the ID token.
    MissingClaim { claim: String },
}

impl AuthenticationError {
    /// Returns true when the user should simply try logging in again.
    #[must_use]
    pub fn is_invalid_code(&self) -> bool {
        !matches!(self, Self::ProviderError { .. })
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCode { reason } => write!(f, "invalid authorization code: {reason}"),
            Self::StateMismatch => write!(f, "OAuth state mismatch"),
            Self::MissingPendingLogin => write!(f, "no pending login for callback"),
            Self::InvalidToken { reason } => write!(f, "invalid ID token: {reason}"),
            Self::ProviderError { provider, reason } => {
                write!(f, "OAuth provider '{provider}' error: {reason}")
            }
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Why an existing application user record refuses the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockReason {
    /// The record was deactivated by an administrator.
    Inactive,
    /// The record exists but has not been activated yet.
    PendingActivation,
    /// The provider did not verify the identity's email address.
    UnverifiedEmail,
    /// The record is bound to a different provider account.
    SubjectMismatch,
    /// The record references a role that no longer exists.
    RoleMissing,
}

impl BlockReason {
    /// Stable wire name of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::PendingActivation => "pendingActivation",
            Self::UnverifiedEmail => "unverifiedEmail",
            Self::SubjectMismatch => "subjectMismatch",
            Self::RoleMissing => "roleMissing",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from resolving an identity to an application user.
///
/// `NotRegistered` and `Blocked` are definitive denials. `Unavailable` means
/// the outcome could not be determined and must never be read as a denial
/// or as a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No application user exists for the identity.
    NotRegistered { email: String },
    /// An application user exists but refuses this identity.
    Blocked { email: String, reason: BlockReason },
    /// The caller lacks a capability.
    PermissionDenied { permission: String },
    /// The lookup could not be completed.
    Unavailable { details: String },
}

impl AuthorizationError {
    /// Returns true for a definitive "not authorized" outcome.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered { email } => write!(f, "no application user for '{email}'"),
            Self::Blocked { email, reason } => {
                write!(f, "application user '{email}' is blocked: {reason}")
            }
            Self::PermissionDenied { permission } => {
                write!(f, "missing permission '{permission}'")
            }
            Self::Unavailable { details } => {
                write!(f, "authorization could not be determined: {details}")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from the invite flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
    /// No invite with this token.
    NotFound,
    /// The invite is past its expiry. Terminal.
    Expired,
    /// The invite was already consumed. Terminal.
    AlreadyUsed,
    /// The submitted corporate email does not match. Retryable.
    ValidationMismatch { corporate_email_hint: Option<String> },
    /// The invite references a role that does not exist.
    RoleNotFound,
    /// The signed-in identity cannot take this invite. The token is kept.
    IdentityRejected { reason: BlockReason },
    /// Invalid parameters when issuing an invite.
    InvalidRequest { details: String },
    /// The inviter lacks `users.invite`.
    PermissionDenied,
    /// Storage failure.
    Unavailable { details: String },
}

impl InviteError {
    /// Returns true if no retry with the same token can ever succeed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Expired | Self::AlreadyUsed | Self::RoleNotFound
        )
    }
}

impl fmt::Display for InviteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "invite not found"),
            Self::Expired => write!(f, "invite has expired"),
            Self::AlreadyUsed => write!(f, "invite was already used"),
            Self::ValidationMismatch { .. } => {
                write!(f, "corporate email does not match the invite")
            }
            Self::RoleNotFound => write!(f, "invite role does not exist"),
            Self::IdentityRejected { reason } => {
                write!(f, "identity cannot accept the invite: {reason}")
            }
            Self::InvalidRequest { details } => write!(f, "invalid invite request: {details}"),
            Self::PermissionDenied => write!(f, "not allowed to issue invites"),
            Self::Unavailable { details } => write!(f, "invite storage unavailable: {details}"),
        }
    }
}

impl std::error::Error for InviteError {}

/// Errors from role administration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    /// Role not found.
    NotFound { id: String },
    /// A permission code is not part of the catalogue.
    UnknownPermission { code: String },
    /// System roles cannot be deleted or renamed.
    SystemRole { name: String },
    /// The role is still assigned to users or offered by open invites.
    InUse {
        name: String,
        users: usize,
        invites: usize,
    },
    /// Another role already uses the name.
    DuplicateName { name: String },
    /// The role name is empty.
    InvalidName,
    /// Storage failure.
    Unavailable { details: String },
}

impl fmt::Display for RoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "role '{id}' not found"),
            Self::UnknownPermission { code } => write!(f, "unknown permission '{code}'"),
            Self::SystemRole { name } => write!(f, "role '{name}' is a system role"),
            Self::InUse {
                name,
                users,
                invites,
            } => write!(
                f,
                "role '{name}' is assigned to {users} user(s) and {invites} open invite(s)"
            ),
            Self::DuplicateName { name } => write!(f, "role '{name}' already exists"),
            Self::InvalidName => write!(f, "role name must not be empty"),
            Self::Unavailable { details } => write!(f, "role storage unavailable: {details}"),
        }
    }
}

impl std::error::Error for RoleError {}

/// Errors from user administration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAdminError {
    /// User not found.
    NotFound { id: String },
    /// Role not found.
    RoleNotFound { id: String },
    /// Owners cannot be deactivated or moved off the administrator role.
    OwnerProtected,
    /// An administrator cannot deactivate their own account.
    SelfDeactivation,
    /// Storage failure.
    Unavailable { details: String },
}

impl fmt::Display for UserAdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "user '{id}' not found"),
            Self::RoleNotFound { id } => write!(f, "role '{id}' not found"),
            Self::OwnerProtected => write!(f, "the owner account cannot be changed this way"),
            Self::SelfDeactivation => write!(f, "cannot deactivate your own account"),
            Self::Unavailable { details } => write!(f, "user storage unavailable: {details}"),
        }
    }
}

impl std::error::Error for UserAdminError {}

/// Errors raised by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or the query failed.
    Backend { details: String },
    /// A stored row could not be decoded into a domain value.
    Corrupt { details: String },
    /// A uniqueness constraint was violated.
    Conflict { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { details } => write!(f, "storage backend error: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt stored value: {details}"),
            Self::Conflict { details } => write!(f, "storage conflict: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_error_invalid_code_display() {
        let err = AuthenticationError::InvalidCode {
            reason: "invalid_grant".to_string(),
        };
        assert!(err.to_string().contains("invalid authorization code"));
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.is_invalid_code());
    }

    #[test]
    fn provider_error_is_not_an_invalid_code() {
        let err = AuthenticationError::ProviderError {
            provider: "google".to_string(),
            reason: "connection timeout".to_string(),
        };
        assert!(err.to_string().contains("google"));
        assert!(!err.is_invalid_code());
    }

    #[test]
    fn unavailable_is_not_a_denial() {
        let unavailable = AuthorizationError::Unavailable {
            details: "pool timed out".to_string(),
        };
        assert!(!unavailable.is_denial());

        let not_registered = AuthorizationError::NotRegistered {
            email: "a@x.com".to_string(),
        };
        assert!(not_registered.is_denial());
        assert!(not_registered.to_string().contains("a@x.com"));
    }

    #[test]
    fn blocked_display_includes_reason() {
        let err = AuthorizationError::Blocked {
            email: "ana@empresa.com.br".to_string(),
            reason: BlockReason::Inactive,
        };
        assert!(err.to_string().contains("inactive"));
    }

    #[test]
    fn invite_terminal_classification() {
        assert!(InviteError::Expired.is_terminal());
        assert!(InviteError::AlreadyUsed.is_terminal());
        assert!(
            !InviteError::IdentityRejected {
                reason: BlockReason::UnverifiedEmail
            }
            .is_terminal()
        );
        assert!(
            !InviteError::ValidationMismatch {
                corporate_email_hint: None
            }
            .is_terminal()
        );
        assert!(
            !InviteError::Unavailable {
                details: "down".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn block_reason_wire_names() {
        let json = serde_json::to_string(&BlockReason::PendingActivation).expect("serialize");
        assert_eq!(json, "\"pendingActivation\"");
        assert_eq!(BlockReason::PendingActivation.as_str(), "pendingActivation");
    }
}
